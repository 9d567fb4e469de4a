use std::io::{self, Write};

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use tracker_api::auth::passwords::{PasswordPolicy, PasswordService};
use tracker_api::models::NewIdentity;
use tracker_api::store::{PgStore, StoreError, UserStore};

#[derive(Parser, Debug)]
#[command(
    name = "create_user",
    about = "Create a tracker user account directly in the database"
)]
struct Args {
    /// Email address for the account (case insensitive).
    #[arg(long)]
    email: String,

    /// Plaintext password to hash and store for this user.
    #[arg(long)]
    password: String,

    #[arg(long)]
    first_name: String,

    #[arg(long)]
    last_name: String,

    #[arg(long)]
    phone: Option<String>,

    #[arg(long)]
    address: Option<String>,
}

/// Reject input the HTTP registration path would also reject.
fn validate(args: &Args) -> Result<String, String> {
    let email = args.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err("email must contain '@'".into());
    }
    if args.first_name.trim().is_empty() || args.last_name.trim().is_empty() {
        return Err("first and last name must not be empty".into());
    }
    PasswordPolicy::default()
        .check(&args.password)
        .map_err(|err| err.to_string())?;
    Ok(email)
}

fn fail(message: impl std::fmt::Display) -> ! {
    let _ = writeln!(io::stderr(), "error: {message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let email = validate(&args).unwrap_or_else(|err| fail(err));

    let password_service = PasswordService::new()
        .map_err(|err| io::Error::other(format!("argon2 init failed: {err}")))?;
    let password_hash = password_service
        .hash_password(&args.password)
        .map_err(|err| io::Error::other(format!("password hash failed: {err}")))?;

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| io::Error::other("DATABASE_URL must be set"))?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;
    let store = PgStore::new(pool);

    let created = store
        .create_user(NewIdentity {
            email: email.clone(),
            first_name: args.first_name.trim().to_string(),
            last_name: args.last_name.trim().to_string(),
            phone: args.phone,
            address: args.address,
            password_hash,
        })
        .await;

    match created {
        Ok(identity) => {
            println!("Created user '{}' with id {}", identity.email, identity.id);
            Ok(())
        }
        Err(StoreError::Conflict(_)) => fail(format!("a user with email '{email}' already exists")),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec![
            "create_user",
            "--email",
            "Ops@Example.com",
            "--first-name",
            "Ada",
            "--last-name",
            "Lovelace",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn normalizes_email_for_valid_input() {
        let args = parse(&["--password", "secret123"]).expect("valid args");
        assert_eq!(validate(&args).as_deref(), Ok("ops@example.com"));
    }

    #[test]
    fn short_passwords_are_refused() {
        let args = parse(&["--password", "short"]).expect("valid args");
        let err = validate(&args).expect_err("weak password");
        assert!(err.contains("at least 8"));
    }

    #[test]
    fn minimum_length_cannot_be_lowered() {
        assert!(parse(&["--password", "short", "--min-password-length", "1"]).is_err());
    }
}
