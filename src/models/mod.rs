pub mod reservation;
pub mod role;
pub mod trip;
pub mod user;
pub mod vehicle;
