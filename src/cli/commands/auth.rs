use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_WEBHOOK_KEY: &str = "webhook-key";
pub const ARG_STATUS: &str = "status";
pub const ARG_REFRESH_TTL_DAYS: &str = "refresh-ttl-days";
pub const ARG_ACCESS_TTL_SECONDS: &str = "access-ttl-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Secret used to sign access tokens (HS256)")
                .env("POSTGATE_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_WEBHOOK_KEY)
                .long(ARG_WEBHOOK_KEY)
                .help("Shared key expected in `Authorization: ApiKey <key>` on webhooks")
                .env("POSTGATE_WEBHOOK_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_STATUS)
                .long(ARG_STATUS)
                .help("Environment status; ADMIN enables DELETE /admin/reset")
                .env("POSTGATE_STATUS"),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL_DAYS)
                .long(ARG_REFRESH_TTL_DAYS)
                .help("Refresh session lifetime in days")
                .env("POSTGATE_REFRESH_TTL_DAYS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_ACCESS_TTL_SECONDS)
                .long(ARG_ACCESS_TTL_SECONDS)
                .help("Default access token lifetime in seconds (max 3600)")
                .env("POSTGATE_ACCESS_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(1..=3600)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub webhook_key: SecretString,
    pub status: Option<String>,
    pub refresh_ttl_days: i64,
    pub access_ttl_seconds: i64,
}

impl Options {
    /// # Errors
    /// Returns an error if a required secret is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .cloned()
            .context("missing required argument: --jwt-secret")?;
        let webhook_key = matches
            .get_one::<String>(ARG_WEBHOOK_KEY)
            .cloned()
            .context("missing required argument: --webhook-key")?;

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret),
            webhook_key: SecretString::from(webhook_key),
            status: matches.get_one::<String>(ARG_STATUS).cloned(),
            refresh_ttl_days: matches
                .get_one::<i64>(ARG_REFRESH_TTL_DAYS)
                .copied()
                .unwrap_or(60),
            access_ttl_seconds: matches
                .get_one::<i64>(ARG_ACCESS_TTL_SECONDS)
                .copied()
                .unwrap_or(3600),
        })
    }
}
