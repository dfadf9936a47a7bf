pub mod chat_stream;
pub mod error;
pub mod image_gen;
pub mod ledger;
pub mod message;
pub mod models;
pub mod persona;
pub mod reasoning;
pub mod turn;
pub mod vision;
