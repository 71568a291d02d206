pub mod index;
pub mod routes;
