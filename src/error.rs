use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("Unreadable source structure: {0}")]
    Format(String),

    #[error("No candidate encoding parsed cleanly: {0}")]
    Encoding(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("XML parsing failed: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Geocoding error: {0}")]
    Geocoding(String),
}

pub type Result<T> = std::result::Result<T, IntegrationError>;
