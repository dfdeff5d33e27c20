//! Cycle de vie des trajets et des réservations.
//!
//! Les places ne sont engagées qu'au moment où le conducteur accepte une
//! demande. Chaque fonction décide d'une transition à partir de lignes déjà
//! verrouillées par l'appelant ; l'écriture reste à la charge des routes.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::AppError;
use crate::models::reservation::{Reservation, ReservationStatus};
use crate::models::role::Role;
use crate::models::trip::{CreateTripForm, Trip, TripStatus, UpdateTripForm};
use crate::models::vehicle::Vehicle;
use crate::utils::extract_user::Session;

/// Effet d'une transition sur les places du trajet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatChange {
    pub seats_remaining: i32,
    pub trip_status: TripStatus,
}

/// Nouvel état d'un trajet après modification par son conducteur
#[derive(Debug, Clone, PartialEq)]
pub struct TripUpdate {
    pub origin: String,
    pub destination: String,
    pub departure_at: DateTime<Utc>,
    pub price: f64,
    pub seats_total: i32,
    pub seats_remaining: i32,
    pub statut: TripStatus,
    pub description: Option<String>,
}

/// Bornes `[début, fin)` en UTC d'une journée du calendrier local
pub fn local_day_bounds(date: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = date.and_time(NaiveTime::MIN) - Duration::seconds(i64::from(offset.local_minus_utc()));
    let start = Utc.from_utc_datetime(&midnight);
    (start, start + Duration::days(1))
}

/// Statut présenté aux clients : un départ passé rend le trajet terminé
pub fn effective_status(trip: &Trip, now: DateTime<Utc>) -> TripStatus {
    if trip.departure_at <= now {
        TripStatus::Termine
    } else {
        trip.statut
    }
}

fn status_for_remaining(seats_remaining: i32) -> TripStatus {
    if seats_remaining == 0 {
        TripStatus::Complet
    } else {
        TripStatus::Actif
    }
}

fn require_owner(trip: &Trip, caller: &Session) -> Result<(), AppError> {
    if trip.driver_id == caller.user_id {
        Ok(())
    } else {
        Err(AppError::forbidden("Seul le conducteur de ce trajet peut effectuer cette action"))
    }
}

fn require_owner_or_admin(trip: &Trip, caller: &Session) -> Result<(), AppError> {
    if caller.is_admin() {
        return Ok(());
    }
    require_owner(trip, caller)
}

fn same_city(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Un conducteur ne publie un trajet qu'avec un véhicule assez grand
pub fn check_trip_creation(
    caller: &Session,
    vehicle: Option<&Vehicle>,
    form: &CreateTripForm,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    caller.require_role(Role::Conducteur)?;
    let vehicle = vehicle.ok_or_else(|| {
        AppError::field("vehicle", "Vous devez d'abord enregistrer un véhicule pour publier un trajet")
    })?;

    if form.seats_total > vehicle.seats {
        return Err(AppError::field(
            "seats_total",
            format!("Votre véhicule ne compte que {} place(s)", vehicle.seats),
        ));
    }
    if form.departure_at <= now {
        return Err(AppError::field("departure_at", "La date de départ doit être dans le futur"));
    }
    if same_city(&form.origin, &form.destination) {
        return Err(AppError::field("destination", "La destination doit différer du départ"));
    }
    Ok(())
}

/// Fusionne une modification partielle en préservant les places confirmées
pub fn plan_trip_update(
    trip: &Trip,
    caller: &Session,
    form: &UpdateTripForm,
    vehicle_seats: Option<i32>,
    now: DateTime<Utc>,
) -> Result<TripUpdate, AppError> {
    require_owner(trip, caller)?;
    if effective_status(trip, now) == TripStatus::Termine {
        return Err(AppError::conflict("Un trajet terminé ne peut plus être modifié"));
    }

    let origin = form.origin.clone().unwrap_or_else(|| trip.origin.clone());
    let destination = form.destination.clone().unwrap_or_else(|| trip.destination.clone());
    if same_city(&origin, &destination) {
        return Err(AppError::field("destination", "La destination doit différer du départ"));
    }

    let departure_at = form.departure_at.unwrap_or(trip.departure_at);
    if form.departure_at.is_some() && departure_at <= now {
        return Err(AppError::field("departure_at", "La date de départ doit être dans le futur"));
    }

    let seats_total = form.seats_total.unwrap_or(trip.seats_total);
    let confirmed = trip.seats_confirmed();
    if seats_total < confirmed {
        return Err(AppError::field(
            "seats_total",
            format!("{confirmed} place(s) sont déjà confirmées sur ce trajet"),
        ));
    }
    if let Some(max) = vehicle_seats {
        if form.seats_total.is_some() && seats_total > max {
            return Err(AppError::field(
                "seats_total",
                format!("Votre véhicule ne compte que {max} place(s)"),
            ));
        }
    }

    let seats_remaining = seats_total - confirmed;
    let statut = match trip.statut {
        TripStatus::Annule => TripStatus::Annule,
        _ => status_for_remaining(seats_remaining),
    };

    Ok(TripUpdate {
        origin,
        destination,
        departure_at,
        price: form.price.unwrap_or(trip.price),
        seats_total,
        seats_remaining,
        statut,
        description: form.description.clone().or_else(|| trip.description.clone()),
    })
}

/// Suppression possible tant qu'aucune place n'est confirmée
pub fn check_trip_deletion(trip: &Trip, caller: &Session) -> Result<(), AppError> {
    require_owner_or_admin(trip, caller)?;
    if trip.seats_confirmed() > 0 {
        return Err(AppError::conflict(
            "Ce trajet a des réservations confirmées : annulez-le plutôt que de le supprimer",
        ));
    }
    Ok(())
}

pub fn cancel_trip(trip: &Trip, caller: &Session) -> Result<TripStatus, AppError> {
    require_owner_or_admin(trip, caller)?;
    match trip.statut {
        TripStatus::Annule => Err(AppError::conflict("Ce trajet est déjà annulé")),
        _ => Ok(TripStatus::Annule),
    }
}

/// Réactivation d'un trajet annulé dont le départ n'est pas passé
pub fn reactivate_trip(trip: &Trip, caller: &Session, now: DateTime<Utc>) -> Result<TripStatus, AppError> {
    require_owner_or_admin(trip, caller)?;
    if trip.statut != TripStatus::Annule {
        return Err(AppError::conflict("Seul un trajet annulé peut être réactivé"));
    }
    if trip.departure_at <= now {
        return Err(AppError::conflict("La date de départ de ce trajet est passée"));
    }
    Ok(status_for_remaining(trip.seats_remaining))
}

/// Conditions d'une nouvelle demande ; aucune place n'est retenue à ce stade
pub fn check_new_reservation(
    trip: &Trip,
    caller: &Session,
    seats: i32,
    has_live_reservation: bool,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    caller.require_role(Role::Voyageur)?;
    if trip.driver_id == caller.user_id {
        return Err(AppError::forbidden("Vous ne pouvez pas réserver votre propre trajet"));
    }
    if effective_status(trip, now) != TripStatus::Actif {
        return Err(AppError::conflict("Ce trajet n'accepte plus de réservations"));
    }
    if seats < 1 {
        return Err(AppError::field("seats", "Au moins une place doit être demandée"));
    }
    if seats > trip.seats_remaining {
        return Err(AppError::field(
            "seats",
            format!("Il ne reste que {} place(s) sur ce trajet", trip.seats_remaining),
        ));
    }
    if has_live_reservation {
        return Err(AppError::conflict("Vous avez déjà une réservation en cours sur ce trajet"));
    }
    Ok(())
}

fn require_pending(reservation: &Reservation) -> Result<(), AppError> {
    if reservation.statut == ReservationStatus::EnAttente {
        Ok(())
    } else {
        Err(AppError::not_found("Aucune réservation en attente avec cet identifiant"))
    }
}

/// Acceptation par le conducteur : engage les places demandées
pub fn accept_reservation(
    reservation: &Reservation,
    trip: &Trip,
    caller: &Session,
    now: DateTime<Utc>,
) -> Result<SeatChange, AppError> {
    require_owner(trip, caller)?;
    require_pending(reservation)?;

    match effective_status(trip, now) {
        TripStatus::Annule => return Err(AppError::conflict("Ce trajet a été annulé")),
        TripStatus::Termine => return Err(AppError::conflict("Ce trajet est terminé")),
        TripStatus::Actif | TripStatus::Complet => {}
    }
    if reservation.seats > trip.seats_remaining {
        return Err(AppError::conflict(format!(
            "Places insuffisantes : {} demandée(s), {} restante(s)",
            reservation.seats, trip.seats_remaining
        )));
    }

    let seats_remaining = trip.seats_remaining - reservation.seats;
    Ok(SeatChange {
        seats_remaining,
        trip_status: status_for_remaining(seats_remaining),
    })
}

/// Refus par le conducteur : aucune place n'est modifiée
pub fn reject_reservation(reservation: &Reservation, trip: &Trip, caller: &Session) -> Result<(), AppError> {
    require_owner(trip, caller)?;
    require_pending(reservation)
}

/// Annulation par le voyageur ; une réservation confirmée libère ses places
pub fn cancel_reservation(
    reservation: &Reservation,
    trip: &Trip,
    caller: &Session,
    now: DateTime<Utc>,
) -> Result<Option<SeatChange>, AppError> {
    if reservation.traveler_id != caller.user_id {
        return Err(AppError::forbidden("Cette réservation ne vous appartient pas"));
    }

    match reservation.statut {
        ReservationStatus::EnAttente => Ok(None),
        ReservationStatus::Confirmee => {
            if effective_status(trip, now) == TripStatus::Termine {
                return Err(AppError::conflict("Ce trajet est déjà terminé"));
            }
            let seats_remaining = (trip.seats_remaining + reservation.seats).min(trip.seats_total);
            let trip_status = match trip.statut {
                TripStatus::Complet => TripStatus::Actif,
                other => other,
            };
            Ok(Some(SeatChange {
                seats_remaining,
                trip_status,
            }))
        }
        ReservationStatus::Rejetee | ReservationStatus::Annulee => {
            Err(AppError::conflict("Cette réservation est déjà close"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DRIVER: i64 = 10;

    fn session(user_id: i64, role: Role) -> Session {
        Session {
            user_id,
            role,
            token_id: format!("jti-{user_id}"),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    fn driver() -> Session {
        session(DRIVER, Role::Conducteur)
    }

    fn trip(seats_total: i32, seats_remaining: i32) -> Trip {
        let now = Utc::now();
        Trip {
            id: 1,
            driver_id: DRIVER,
            origin: "Casablanca".to_string(),
            destination: "Rabat".to_string(),
            departure_at: now + Duration::days(2),
            price: 60.0,
            seats_total,
            seats_remaining,
            statut: status_for_remaining(seats_remaining),
            description: None,
            created_at: now,
        }
    }

    fn pending(id: i64, traveler_id: i64, seats: i32) -> Reservation {
        let now = Utc::now();
        Reservation {
            id,
            trip_id: 1,
            traveler_id,
            seats,
            message: None,
            statut: ReservationStatus::EnAttente,
            created_at: now,
            updated_at: now,
        }
    }

    fn vehicle(seats: i32) -> Vehicle {
        Vehicle {
            id: 5,
            user_id: DRIVER,
            make: "Dacia".to_string(),
            model: "Logan".to_string(),
            color: "Gris".to_string(),
            year: 2019,
            seats,
            description: None,
            created_at: Utc::now(),
        }
    }

    fn create_form(seats_total: i32) -> CreateTripForm {
        CreateTripForm {
            origin: "Fès".to_string(),
            destination: "Meknès".to_string(),
            departure_at: Utc::now() + Duration::days(1),
            price: 40.0,
            seats_total,
            description: None,
        }
    }

    /// Applique une acceptation comme le ferait la transaction SQL
    fn apply(trip: &mut Trip, reservation: &mut Reservation, change: SeatChange) {
        trip.seats_remaining = change.seats_remaining;
        trip.statut = change.trip_status;
        reservation.statut = ReservationStatus::Confirmee;
    }

    #[test]
    fn second_acceptance_beyond_capacity_conflicts() {
        let now = Utc::now();
        let mut t = trip(4, 4);
        let mut a = pending(1, 21, 3);
        let b = pending(2, 22, 2);

        let change = accept_reservation(&a, &t, &driver(), now).unwrap();
        apply(&mut t, &mut a, change);
        assert_eq!(t.seats_remaining, 1);
        assert_eq!(a.statut, ReservationStatus::Confirmee);

        let err = accept_reservation(&b, &t, &driver(), now).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(b.statut, ReservationStatus::EnAttente);
        assert!(reject_reservation(&b, &t, &driver()).is_ok());
    }

    #[test]
    fn last_seat_completes_trip() {
        let t = trip(3, 2);
        let change = accept_reservation(&pending(1, 21, 2), &t, &driver(), Utc::now()).unwrap();
        assert_eq!(
            change,
            SeatChange {
                seats_remaining: 0,
                trip_status: TripStatus::Complet
            }
        );
    }

    #[test]
    fn accepting_twice_never_decrements_twice() {
        let now = Utc::now();
        let mut t = trip(4, 4);
        let mut r = pending(1, 21, 2);
        let change = accept_reservation(&r, &t, &driver(), now).unwrap();
        apply(&mut t, &mut r, change);

        assert!(matches!(
            accept_reservation(&r, &t, &driver(), now),
            Err(AppError::NotFound(_))
        ));
        assert_eq!(t.seats_remaining, 2);
    }

    #[test]
    fn only_owning_driver_decides() {
        let t = trip(4, 4);
        let r = pending(1, 21, 1);
        let other_driver = session(99, Role::Conducteur);
        let admin = session(1, Role::Admin);

        assert!(matches!(
            accept_reservation(&r, &t, &other_driver, Utc::now()),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            accept_reservation(&r, &t, &admin, Utc::now()),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(reject_reservation(&r, &t, &other_driver), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn rejected_reservation_cannot_be_accepted() {
        let t = trip(4, 4);
        let mut r = pending(1, 21, 1);
        reject_reservation(&r, &t, &driver()).unwrap();
        r.statut = ReservationStatus::Rejetee;

        assert!(matches!(
            accept_reservation(&r, &t, &driver(), Utc::now()),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(reject_reservation(&r, &t, &driver()), Err(AppError::NotFound(_))));
    }

    #[test]
    fn cancelled_trip_accepts_nothing() {
        let mut t = trip(4, 4);
        t.statut = TripStatus::Annule;
        assert!(matches!(
            accept_reservation(&pending(1, 21, 1), &t, &driver(), Utc::now()),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn confirmed_seats_never_exceed_capacity() {
        let now = Utc::now();
        for total in 1..=6 {
            let mut t = trip(total, total);
            let mut requests: Vec<Reservation> =
                (0..8).map(|i| pending(i, 100 + i, (i as i32 % 3) + 1)).collect();

            for r in requests.iter_mut() {
                if let Ok(change) = accept_reservation(r, &t, &driver(), now) {
                    apply(&mut t, r, change);
                }
            }

            let confirmed: i32 = requests
                .iter()
                .filter(|r| r.statut == ReservationStatus::Confirmee)
                .map(|r| r.seats)
                .sum();
            assert!(confirmed <= t.seats_total);
            assert_eq!(confirmed, t.seats_confirmed());
        }
    }

    #[test]
    fn new_reservation_preconditions() {
        let now = Utc::now();
        let t = trip(4, 2);
        let traveler = session(21, Role::Voyageur);

        assert!(check_new_reservation(&t, &traveler, 2, false, now).is_ok());
        assert!(matches!(
            check_new_reservation(&t, &traveler, 3, false, now),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            check_new_reservation(&t, &traveler, 1, true, now),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            check_new_reservation(&t, &driver(), 1, false, now),
            Err(AppError::Forbidden(_))
        ));

        let mut full = trip(4, 0);
        assert!(check_new_reservation(&full, &traveler, 1, false, now).is_err());
        full.statut = TripStatus::Annule;
        assert!(matches!(
            check_new_reservation(&full, &traveler, 1, false, now),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn past_trip_is_reported_finished() {
        let mut t = trip(4, 4);
        let now = Utc::now();
        assert_eq!(effective_status(&t, now), TripStatus::Actif);
        t.departure_at = now - Duration::hours(1);
        assert_eq!(effective_status(&t, now), TripStatus::Termine);
        assert!(check_new_reservation(&t, &session(21, Role::Voyageur), 1, false, now).is_err());
    }

    #[test]
    fn driver_without_vehicle_cannot_publish() {
        let err = check_trip_creation(&driver(), None, &create_form(3), Utc::now()).unwrap_err();
        match err {
            AppError::Validation(fields) => assert!(fields.contains_key("vehicle")),
            other => panic!("erreur inattendue : {other:?}"),
        }
    }

    #[test]
    fn trip_creation_checks_vehicle_and_role() {
        let now = Utc::now();
        assert!(check_trip_creation(&driver(), Some(&vehicle(4)), &create_form(4), now).is_ok());
        assert!(check_trip_creation(&driver(), Some(&vehicle(4)), &create_form(5), now).is_err());
        assert!(matches!(
            check_trip_creation(&session(21, Role::Voyageur), Some(&vehicle(4)), &create_form(2), now),
            Err(AppError::Forbidden(_))
        ));

        let mut form = create_form(2);
        form.destination = " fès ".to_string();
        assert!(check_trip_creation(&driver(), Some(&vehicle(4)), &form, now).is_err());
    }

    #[test]
    fn resizing_keeps_confirmed_seats() {
        let now = Utc::now();
        let t = trip(4, 1);
        let mut form = UpdateTripForm {
            origin: None,
            destination: None,
            departure_at: None,
            price: Some(75.0),
            seats_total: Some(3),
            description: None,
        };

        let update = plan_trip_update(&t, &driver(), &form, Some(4), now).unwrap();
        assert_eq!(update.seats_remaining, 0);
        assert_eq!(update.statut, TripStatus::Complet);
        assert_eq!(update.price, 75.0);

        form.seats_total = Some(2);
        assert!(matches!(
            plan_trip_update(&t, &driver(), &form, Some(4), now),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            plan_trip_update(&t, &session(99, Role::Conducteur), &form, Some(4), now),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn cancel_and_reactivate_by_owner_or_admin() {
        let now = Utc::now();
        let mut t = trip(4, 0);
        let admin = session(1, Role::Admin);

        assert_eq!(cancel_trip(&t, &driver()).unwrap(), TripStatus::Annule);
        assert!(matches!(
            cancel_trip(&t, &session(21, Role::Voyageur)),
            Err(AppError::Forbidden(_))
        ));

        t.statut = TripStatus::Annule;
        assert!(matches!(cancel_trip(&t, &admin), Err(AppError::Conflict(_))));
        // sans place restante, la réactivation rend le trajet complet
        assert_eq!(reactivate_trip(&t, &admin, now).unwrap(), TripStatus::Complet);

        t.seats_remaining = 2;
        assert_eq!(reactivate_trip(&t, &driver(), now).unwrap(), TripStatus::Actif);

        t.statut = TripStatus::Actif;
        assert!(matches!(reactivate_trip(&t, &driver(), now), Err(AppError::Conflict(_))));
    }

    #[test]
    fn deletion_refused_with_confirmed_seats() {
        let admin = session(1, Role::Admin);
        assert!(check_trip_deletion(&trip(4, 4), &driver()).is_ok());
        assert!(check_trip_deletion(&trip(4, 4), &admin).is_ok());
        assert!(matches!(
            check_trip_deletion(&trip(4, 3), &driver()),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn traveler_cancellation_releases_confirmed_seats() {
        let now = Utc::now();
        let traveler = session(21, Role::Voyageur);
        let t = trip(4, 0);

        let mut r = pending(1, 21, 2);
        assert_eq!(cancel_reservation(&r, &t, &traveler, now).unwrap(), None);

        r.statut = ReservationStatus::Confirmee;
        let change = cancel_reservation(&r, &t, &traveler, now).unwrap().unwrap();
        assert_eq!(change.seats_remaining, 2);
        assert_eq!(change.trip_status, TripStatus::Actif);

        assert!(matches!(
            cancel_reservation(&r, &t, &session(22, Role::Voyageur), now),
            Err(AppError::Forbidden(_))
        ));

        r.statut = ReservationStatus::Annulee;
        assert!(matches!(
            cancel_reservation(&r, &t, &traveler, now),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn search_day_follows_the_local_calendar() {
        let morocco = FixedOffset::east_opt(3600).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let (start, end) = local_day_bounds(day, morocco);

        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 9, 23, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 10, 23, 0, 0).unwrap());

        // départ à 00h30 heure locale, encore le 9 en UTC
        let early = Utc.with_ymd_and_hms(2025, 3, 9, 23, 30, 0).unwrap();
        assert!(start <= early && early < end);
    }
}
