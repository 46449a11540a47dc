use clap::{Arg, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_PASSWORD_MIN_LENGTH: &str = "password-min-length";
pub const ARG_LOGIN_DESTINATION: &str = "login-destination";
pub const ARG_UNAUTHORIZED_DESTINATION: &str = "unauthorized-destination";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_email_args(command);
    let command = with_session_args(command);
    with_guard_args(command)
}

fn with_email_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for verification and reset links")
                .env("WAYFARER_FRONTEND_BASE_URL")
                .default_value("https://wayfarer.travel"),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Verification and password reset token TTL in seconds")
                .env("WAYFARER_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("WAYFARER_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_MIN_LENGTH)
                .long(ARG_PASSWORD_MIN_LENGTH)
                .help("Minimum accepted password length")
                .env("WAYFARER_PASSWORD_MIN_LENGTH")
                .default_value("8")
                .value_parser(clap::value_parser!(usize)),
        )
}

fn with_guard_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOGIN_DESTINATION)
                .long(ARG_LOGIN_DESTINATION)
                .help("Redirect destination for protected requests without a session")
                .env("WAYFARER_LOGIN_DESTINATION")
                .default_value("/login"),
        )
        .arg(
            Arg::new(ARG_UNAUTHORIZED_DESTINATION)
                .long(ARG_UNAUTHORIZED_DESTINATION)
                .help("Redirect destination for requests with an insufficient role")
                .env("WAYFARER_UNAUTHORIZED_DESTINATION")
                .default_value("/unauthorized"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Command;

    #[test]
    fn defaults_apply() {
        let command = with_args(Command::new("test"));
        let matches = command.get_matches_from(vec!["test"]);

        assert_eq!(
            matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .map(String::as_str),
            Some("https://wayfarer.travel")
        );
        assert_eq!(
            matches.get_one::<i64>(ARG_TOKEN_TTL_SECONDS).copied(),
            Some(3600)
        );
        assert_eq!(
            matches.get_one::<i64>(ARG_SESSION_TTL_SECONDS).copied(),
            Some(604_800)
        );
        assert_eq!(
            matches.get_one::<usize>(ARG_PASSWORD_MIN_LENGTH).copied(),
            Some(8)
        );
        assert_eq!(
            matches
                .get_one::<String>(ARG_LOGIN_DESTINATION)
                .map(String::as_str),
            Some("/login")
        );
        assert_eq!(
            matches
                .get_one::<String>(ARG_UNAUTHORIZED_DESTINATION)
                .map(String::as_str),
            Some("/unauthorized")
        );
    }

    #[test]
    fn env_overrides_defaults() {
        temp_env::with_vars(
            [
                ("WAYFARER_TOKEN_TTL_SECONDS", Some("120")),
                ("WAYFARER_LOGIN_DESTINATION", Some("/signin")),
            ],
            || {
                let command = with_args(Command::new("test"));
                let matches = command.get_matches_from(vec!["test"]);
                assert_eq!(
                    matches.get_one::<i64>(ARG_TOKEN_TTL_SECONDS).copied(),
                    Some(120)
                );
                assert_eq!(
                    matches
                        .get_one::<String>(ARG_LOGIN_DESTINATION)
                        .map(String::as_str),
                    Some("/signin")
                );
            },
        );
    }
}
