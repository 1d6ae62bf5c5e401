use std::env;

/// Configuración del servicio, leída del entorno al arrancar.
///
/// Las llaves y secretos NUNCA se incrustan en el código; vienen de
/// variables de entorno (cargadas de `.env` en desarrollo).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: String,

    pub monnify_base_url: String,
    pub monnify_api_key: String,
    pub monnify_secret_key: String,
    pub monnify_contract_code: String,

    pub peyflex_base_url: String,
    pub peyflex_api_token: String,

    /// Número de workers de liquidación.
    pub settlement_workers: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT").unwrap_or_else(|_| "3000".to_string()),

            monnify_base_url: env::var("MONNIFY_BASE_URL")
                .unwrap_or_else(|_| "https://api.monnify.com".to_string()),
            monnify_api_key: env::var("MONNIFY_API_KEY")?,
            monnify_secret_key: env::var("MONNIFY_SECRET_KEY")?,
            monnify_contract_code: env::var("MONNIFY_CONTRACT_CODE")?,

            peyflex_base_url: env::var("PEYFLEX_BASE_URL")
                .unwrap_or_else(|_| "https://client.peyflex.com.ng".to_string()),
            peyflex_api_token: env::var("PEYFLEX_API_TOKEN")?,

            settlement_workers: env::var("SETTLEMENT_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
        })
    }
}
