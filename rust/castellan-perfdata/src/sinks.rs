pub mod http;
pub mod line;
pub mod otlp;
