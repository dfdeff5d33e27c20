use actix_web::{web, HttpResponse};
use chrono::{Datelike, Utc};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use validator::Validate;

use crate::error::{is_unique_violation, AppError};
use crate::models::role::Role;
use crate::models::vehicle::{Vehicle, VehicleForm, VEHICLE_COLUMNS};
use crate::utils::extract_user::Session;
use crate::utils::validation::non_empty;

/// Véhicule d'un conducteur, s'il en a enregistré un
pub(crate) async fn find_vehicle_of(pool: &MySqlPool, user_id: i64) -> Result<Option<Vehicle>, AppError> {
    let vehicle = sqlx::query_as::<_, Vehicle>(&format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE user_id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(vehicle)
}

fn check_year(form: &VehicleForm) -> Result<(), AppError> {
    let max_year = Utc::now().year() + 1;
    if form.year > max_year {
        return Err(AppError::field("year", format!("L'année ne peut pas dépasser {max_year}")));
    }
    Ok(())
}

/// Plus grand nombre de places proposé sur un trajet encore ouvert
async fn largest_open_trip(pool: &MySqlPool, driver_id: i64) -> Result<Option<i32>, AppError> {
    let seats: Option<i32> = sqlx::query_scalar(
        "SELECT MAX(seats_total) FROM trips \
         WHERE driver_id = ? AND statut IN ('actif', 'complet') AND departure_at > ?",
    )
    .bind(driver_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(seats)
}

async fn my_vehicle(pool: web::Data<MySqlPool>, session: Session) -> Result<HttpResponse, AppError> {
    session.require_role(Role::Conducteur)?;
    let vehicle = find_vehicle_of(pool.get_ref(), session.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "vehicle": vehicle })))
}

async fn create_vehicle(
    pool: web::Data<MySqlPool>,
    session: Session,
    form: web::Json<VehicleForm>,
) -> Result<HttpResponse, AppError> {
    session.require_role(Role::Conducteur)?;
    form.validate()?;
    check_year(&form)?;

    if find_vehicle_of(pool.get_ref(), session.user_id).await?.is_some() {
        return Err(AppError::conflict("Vous avez déjà enregistré un véhicule"));
    }

    sqlx::query(
        "INSERT INTO vehicles (user_id, make, model, color, year, seats, description) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(session.user_id)
    .bind(form.make.trim())
    .bind(form.model.trim())
    .bind(form.color.trim())
    .bind(form.year)
    .bind(form.seats)
    .bind(non_empty(form.description.as_deref()))
    .execute(pool.get_ref())
    .await
    .map_err(|err| {
        // deux créations simultanées : la contrainte d'unicité tranche
        if is_unique_violation(&err) {
            AppError::conflict("Vous avez déjà enregistré un véhicule")
        } else {
            AppError::Database(err)
        }
    })?;
    info!(user_id = session.user_id, "véhicule enregistré");

    let vehicle = find_vehicle_of(pool.get_ref(), session.user_id).await?;
    Ok(HttpResponse::Created().json(json!({ "vehicle": vehicle })))
}

async fn update_vehicle(
    pool: web::Data<MySqlPool>,
    session: Session,
    form: web::Json<VehicleForm>,
) -> Result<HttpResponse, AppError> {
    session.require_role(Role::Conducteur)?;
    form.validate()?;
    check_year(&form)?;

    if find_vehicle_of(pool.get_ref(), session.user_id).await?.is_none() {
        return Err(AppError::not_found("Aucun véhicule enregistré"));
    }
    if let Some(offered) = largest_open_trip(pool.get_ref(), session.user_id).await? {
        if form.seats < offered {
            return Err(AppError::field(
                "seats",
                format!("Un de vos trajets ouverts propose {offered} place(s)"),
            ));
        }
    }

    sqlx::query(
        "UPDATE vehicles SET make = ?, model = ?, color = ?, year = ?, seats = ?, description = ? \
         WHERE user_id = ?",
    )
    .bind(form.make.trim())
    .bind(form.model.trim())
    .bind(form.color.trim())
    .bind(form.year)
    .bind(form.seats)
    .bind(non_empty(form.description.as_deref()))
    .bind(session.user_id)
    .execute(pool.get_ref())
    .await?;

    let vehicle = find_vehicle_of(pool.get_ref(), session.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "vehicle": vehicle })))
}

async fn delete_vehicle(pool: web::Data<MySqlPool>, session: Session) -> Result<HttpResponse, AppError> {
    session.require_role(Role::Conducteur)?;

    if largest_open_trip(pool.get_ref(), session.user_id).await?.is_some() {
        return Err(AppError::conflict(
            "Impossible de supprimer le véhicule tant que des trajets sont ouverts",
        ));
    }

    let result = sqlx::query("DELETE FROM vehicles WHERE user_id = ?")
        .bind(session.user_id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Aucun véhicule enregistré"));
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Véhicule supprimé avec succès" })))
}

/// Le client utilise indifféremment les deux chemins
pub fn config(cfg: &mut web::ServiceConfig) {
    for path in ["/my-vehicles", "/profile/vehicle"] {
        cfg.service(
            web::resource(path)
                .route(web::get().to(my_vehicle))
                .route(web::post().to(create_vehicle))
                .route(web::put().to(update_vehicle))
                .route(web::delete().to(delete_vehicle)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(year: i32, seats: i32) -> VehicleForm {
        VehicleForm {
            make: "Dacia".to_string(),
            model: "Logan".to_string(),
            color: "Blanc".to_string(),
            year,
            seats,
            description: None,
        }
    }

    #[test]
    fn year_must_be_between_1990_and_next_year() {
        let next_year = Utc::now().year() + 1;

        assert!(form(1990, 4).validate().is_ok());
        assert!(form(1989, 4).validate().unwrap_err().field_errors().contains_key("year"));

        assert!(check_year(&form(next_year, 4)).is_ok());
        assert!(matches!(
            check_year(&form(next_year + 1, 4)),
            Err(AppError::Validation(errors)) if errors.contains_key("year")
        ));
    }

    #[test]
    fn seats_must_be_between_1_and_8() {
        assert!(form(2018, 1).validate().is_ok());
        assert!(form(2018, 8).validate().is_ok());
        assert!(form(2018, 0).validate().unwrap_err().field_errors().contains_key("seats"));
        assert!(form(2018, 9).validate().unwrap_err().field_errors().contains_key("seats"));
    }
}
