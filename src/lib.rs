pub mod audio;
pub mod format;
pub mod integration;
pub mod llm;
pub mod messages;
pub mod session;
pub mod speech;
pub mod ui;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QurmaError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    #[error("Audio processing error: {0}")]
    AudioProcessingError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Interrupted: {0}")]
    Interrupted(String),
}

impl From<std::io::Error> for QurmaError {
    fn from(e: std::io::Error) -> Self {
        QurmaError::StorageError(e.to_string())
    }
}

impl From<serde_json::Error> for QurmaError {
    fn from(e: serde_json::Error) -> Self {
        QurmaError::SerializationError(e.to_string())
    }
}

impl QurmaError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // A missing or malformed credential never fixes itself
            QurmaError::ConfigError(_) => false,
            // Each remote failure is terminal for its own request only
            QurmaError::TransportError(_) => true,
            QurmaError::EmptyResponse(_) => true,
            QurmaError::Timeout(_) => true,
            // Microphone permission or missing device needs the user
            QurmaError::AudioDeviceError(_) => false,
            QurmaError::AudioProcessingError(_) => true,
            QurmaError::StorageError(_) => false,
            QurmaError::SerializationError(_) => false,
            QurmaError::ChannelError(_) => false,
            QurmaError::NotFound(_) => true,
            QurmaError::Interrupted(_) => true,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            QurmaError::ConfigError(_) => {
                "Konfigurasi tidak lengkap. Pastikan API key sudah diatur.".to_string()
            }
            QurmaError::TransportError(_) | QurmaError::Timeout(_) => {
                "Terjadi kesalahan koneksi. Silakan coba lagi.".to_string()
            }
            QurmaError::EmptyResponse(_) => "Maaf, terjadi kesalahan.".to_string(),
            QurmaError::AudioDeviceError(_) => {
                "Mikrofon tidak dapat diakses. Periksa izin dan perangkat audio Anda.".to_string()
            }
            QurmaError::AudioProcessingError(_) => {
                "Gagal memproses rekaman suara. Silakan coba lagi.".to_string()
            }
            QurmaError::StorageError(_) | QurmaError::SerializationError(_) => {
                "Riwayat percakapan tidak dapat disimpan.".to_string()
            }
            QurmaError::ChannelError(_) => {
                "Terjadi kesalahan internal. Silakan mulai ulang aplikasi.".to_string()
            }
            QurmaError::NotFound(_) => "Pesan atau sesi tidak ditemukan.".to_string(),
            QurmaError::Interrupted(_) => "Jawaban terhenti karena sesi diganti.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QurmaError>;
