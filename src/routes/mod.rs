pub mod layers;
pub mod routes;
