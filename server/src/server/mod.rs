pub mod routes;

pub use routes::{AppState, WhatsappErrorResponse, whatsapp_routes};
