use std::env;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub server_host: String,
    pub server_port: u16,
    /// Outbound push relay; when unset, notifications only land in the inbox.
    pub push_gateway_url: Option<String>,
    pub reminder_lead_minutes: i64,
    pub expiry_sweep_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            jwt_expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a number"),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("SERVER_PORT must be a number"),
            push_gateway_url: env::var("PUSH_GATEWAY_URL").ok(),
            reminder_lead_minutes: env::var("REMINDER_LEAD_MINUTES")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .expect("REMINDER_LEAD_MINUTES must be a number"),
            expiry_sweep_seconds: env::var("EXPIRY_SWEEP_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .expect("EXPIRY_SWEEP_SECONDS must be a number"),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
