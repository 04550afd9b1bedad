use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid period: {year}-{month}")]
    InvalidPeriod { year: i32, month: u32 },

    #[error("Unknown section: {0}")]
    UnknownSection(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Row not found: {0}")]
    RowNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Privileged mode required")]
    ReadOnly,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Export error: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::Remote(err.to_string())
    }
}

#[cfg(feature = "web")]
mod response {
    use super::LedgerError;
    use axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use serde::Serialize;

    #[derive(Serialize)]
    pub struct ErrorResponse {
        pub error: String,
    }

    impl IntoResponse for LedgerError {
        fn into_response(self) -> Response {
            let status = match &self {
                LedgerError::ReadOnly => StatusCode::UNAUTHORIZED,
                LedgerError::UnknownSection(_)
                | LedgerError::ColumnNotFound(_)
                | LedgerError::RowNotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::InvalidPeriod { .. } | LedgerError::InvalidInput(_) => {
                    StatusCode::BAD_REQUEST
                }
                LedgerError::Remote(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };

            if status.is_server_error() {
                log::error!("{}", self);
            } else {
                log::debug!("{}", self);
            }

            let body = Json(ErrorResponse {
                error: self.to_string(),
            });
            (status, body).into_response()
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
