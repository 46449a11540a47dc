//! Database helpers for accounts, tokens, and sessions.
//!
//! Token issuance and consumption are the invariant-bearing operations here:
//! issuing deletes any live token for the identifier in the same statement
//! batch, and consumption is a single conditional `DELETE ... RETURNING`, so
//! two concurrent consumers of the same token can never both succeed.

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::principal::Role;
use super::utils::{generate_session_token, generate_token, hash_session_token, is_unique_violation};

/// Outcome when attempting to create a new user record.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created,
    Conflict,
}

/// Outcome of consuming a verification or reset token.
#[derive(Debug)]
pub(super) enum ConsumeOutcome {
    /// Token was live and the side effect was applied for this email.
    Consumed { email: String },
    /// No record exists for the presented token string.
    NotFound,
    /// A record exists but its expiry has passed. The row is left in place;
    /// stale tokens stay inert until superseded.
    Expired,
    /// The token was live but no user matches its identifier.
    UserNotFound,
}

/// Fields needed to check a password login.
pub(super) struct LoginRecord {
    pub(super) user_id: Uuid,
    pub(super) password_hash: String,
    pub(super) verified: bool,
}

/// Minimal data returned for a valid session cookie.
pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
    pub(crate) email: String,
    pub(crate) name: String,
    pub(crate) role: Role,
}

pub(super) async fn insert_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    name: &str,
) -> Result<SignupOutcome> {
    // The unique constraint on email is the backstop for concurrent
    // registrations; no pre-check, the insert either lands or conflicts.
    let query = r"
        INSERT INTO users (email, password_hash, name, role)
        VALUES ($1, $2, $3, 'customer')
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(_) => Ok(SignupOutcome::Created),
        Err(err) if is_unique_violation(&err) => Ok(SignupOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Issue a verification token for the identifier, superseding any live one.
pub(super) async fn issue_verification_token(
    pool: &PgPool,
    identifier: &str,
    ttl_seconds: i64,
) -> Result<String> {
    issue_token(
        pool,
        "verification_tokens",
        "identifier",
        identifier,
        ttl_seconds,
    )
    .await
}

/// Issue a password reset token for the email, superseding any live one.
pub(super) async fn issue_password_reset_token(
    pool: &PgPool,
    email: &str,
    ttl_seconds: i64,
) -> Result<String> {
    issue_token(pool, "password_reset_tokens", "email", email, ttl_seconds).await
}

async fn issue_token(
    pool: &PgPool,
    table: &str,
    key_column: &str,
    identifier: &str,
    ttl_seconds: i64,
) -> Result<String> {
    // Delete-then-insert in one transaction keeps at most one live token per
    // identifier, even with concurrent issuers for the same address.
    let mut tx = pool.begin().await.context("begin issue transaction")?;

    let delete = format!("DELETE FROM {table} WHERE {key_column} = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = delete.as_str()
    );
    sqlx::query(&delete)
        .bind(identifier)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .with_context(|| format!("failed to delete stale rows from {table}"))?;

    let token = generate_token()?;
    let insert = format!(
        "INSERT INTO {table} ({key_column}, token, expires_at)
         VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = insert.as_str()
    );
    sqlx::query(&insert)
        .bind(identifier)
        .bind(&token)
        .bind(ttl_seconds)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .with_context(|| format!("failed to insert token into {table}"))?;

    tx.commit().await.context("commit issue transaction")?;

    Ok(token)
}

/// Consume a verification token and mark the matching user verified.
pub(super) async fn consume_verification_token(
    pool: &PgPool,
    token: &str,
) -> Result<ConsumeOutcome> {
    let mut tx = pool.begin().await.context("begin verify transaction")?;

    let identifier = match take_live_token(&mut tx, "verification_tokens", "identifier", token)
        .await?
    {
        TakeResult::Taken(identifier) => identifier,
        TakeResult::Missing => {
            let _ = tx.rollback().await;
            return Ok(ConsumeOutcome::NotFound);
        }
        TakeResult::Stale => {
            let _ = tx.rollback().await;
            return Ok(ConsumeOutcome::Expired);
        }
    };

    // The identifier is the canonical email after verification; writing it
    // back also covers flows where the verified address replaces the stored one.
    let query = r"
        UPDATE users
        SET email_verified_at = NOW(),
            email = $1,
            updated_at = NOW()
        WHERE email = $1
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(&identifier)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to mark user verified")?;

    if row.is_none() {
        let _ = tx.rollback().await;
        return Ok(ConsumeOutcome::UserNotFound);
    }

    tx.commit().await.context("commit verify transaction")?;
    Ok(ConsumeOutcome::Consumed { email: identifier })
}

/// Consume a reset token and replace the matching user's password hash.
///
/// All live sessions for the user are revoked in the same transaction.
pub(super) async fn consume_password_reset_token(
    pool: &PgPool,
    token: &str,
    new_password_hash: &str,
) -> Result<ConsumeOutcome> {
    let mut tx = pool.begin().await.context("begin reset transaction")?;

    let email = match take_live_token(&mut tx, "password_reset_tokens", "email", token).await? {
        TakeResult::Taken(email) => email,
        TakeResult::Missing => {
            let _ = tx.rollback().await;
            return Ok(ConsumeOutcome::NotFound);
        }
        TakeResult::Stale => {
            let _ = tx.rollback().await;
            return Ok(ConsumeOutcome::Expired);
        }
    };

    let query = r"
        UPDATE users
        SET password_hash = $2,
            updated_at = NOW()
        WHERE email = $1
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(&email)
        .bind(new_password_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update password hash")?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Ok(ConsumeOutcome::UserNotFound);
    };

    let user_id: Uuid = row.get("id");
    let query = "DELETE FROM user_sessions WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to revoke sessions after password reset")?;

    tx.commit().await.context("commit reset transaction")?;
    Ok(ConsumeOutcome::Consumed { email })
}

enum TakeResult {
    Taken(String),
    Missing,
    Stale,
}

/// Atomically remove a live token row and return its identifier.
///
/// The conditional delete is the exactly-once guarantee: of two concurrent
/// consumers, only one observes the row. Expiry is strict: `now >= expires_at`
/// fails, and expired rows are left untouched.
async fn take_live_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    table: &str,
    key_column: &str,
    token: &str,
) -> Result<TakeResult> {
    let delete = format!(
        "DELETE FROM {table}
         WHERE token = $1 AND expires_at > NOW()
         RETURNING {key_column}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = delete.as_str()
    );
    let row = sqlx::query(&delete)
        .bind(token)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .with_context(|| format!("failed to consume token from {table}"))?;

    if let Some(row) = row {
        return Ok(TakeResult::Taken(row.get(0)));
    }

    // Distinguish a stale row from an unknown token for the caller's message.
    let select = format!("SELECT 1 FROM {table} WHERE token = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = select.as_str()
    );
    let stale = sqlx::query(&select)
        .bind(token)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .with_context(|| format!("failed to check stale token in {table}"))?;

    Ok(if stale.is_some() {
        TakeResult::Stale
    } else {
        TakeResult::Missing
    })
}

/// Look up login data by email.
pub(super) async fn lookup_login_record(pool: &PgPool, email: &str) -> Result<Option<LoginRecord>> {
    let query = r"
        SELECT id, password_hash, email_verified_at IS NOT NULL AS verified
        FROM users
        WHERE email = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup login record")?;

    Ok(row.map(|row| LoginRecord {
        user_id: row.get("id"),
        password_hash: row.get("password_hash"),
        verified: row.get("verified"),
    }))
}

/// Whether a user record exists for the email.
pub(super) async fn user_exists(pool: &PgPool, email: &str) -> Result<bool> {
    let query = "SELECT 1 FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check user existence")?;
    Ok(row.is_some())
}

/// Whether an unverified user record exists for the email.
///
/// Verified accounts return `false`; resending a verification link to them
/// would only be a probing signal.
pub(super) async fn unverified_user_exists(pool: &PgPool, email: &str) -> Result<bool> {
    let query = "SELECT 1 FROM users WHERE email = $1 AND email_verified_at IS NULL";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check unverified user existence")?;
    Ok(row.is_some())
}

pub(super) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    // Generate a random token, store only its hash, and return the raw value
    // so the caller can set the session cookie.
    let query = r"
        INSERT INTO user_sessions (user_id, session_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

pub(crate) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    // Only unexpired sessions resolve to a caller.
    let query = r"
        SELECT users.id, users.email, users.name, users.role
        FROM user_sessions
        JOIN users ON users.id = user_sessions.user_id
        WHERE user_sessions.session_hash = $1
          AND user_sessions.expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    let Some(row) = row else {
        return Ok(None);
    };

    // Record activity for audit/visibility without extending the session TTL.
    let query = r"
        UPDATE user_sessions
        SET last_seen_at = NOW()
        WHERE session_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    let role_text: String = row.get("role");
    let role = Role::parse(&role_text).ok_or_else(|| anyhow!("unknown role: {role_text}"))?;

    Ok(Some(SessionRecord {
        user_id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        role,
    }))
}

pub(super) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM user_sessions WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        ConsumeOutcome, LoginRecord, SignupOutcome, consume_verification_token, insert_user,
        issue_verification_token,
    };
    use anyhow::Result;
    use sqlx::{PgPool, Row, postgres::PgPoolOptions};
    use uuid::Uuid;

    // Store-backed tests need a real database; set WAYFARER_TEST_DSN to run
    // them, e.g. postgres://postgres@localhost:5432/wayfarer_test. Without it
    // they are no-ops so the default `cargo test` stays hermetic.
    async fn integration_pool() -> Result<Option<PgPool>> {
        let Ok(dsn) = std::env::var("WAYFARER_TEST_DSN") else {
            return Ok(None);
        };
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&dsn)
            .await?;
        sqlx::migrate!().run(&pool).await?;
        Ok(Some(pool))
    }

    fn unique_email() -> String {
        format!("it-{}@example.com", Uuid::new_v4())
    }

    #[tokio::test]
    async fn reissuing_supersedes_previous_token() -> Result<()> {
        let Some(pool) = integration_pool().await? else {
            return Ok(());
        };
        let email = unique_email();
        insert_user(&pool, &email, "$argon2id$stub", "It User").await?;

        let first = issue_verification_token(&pool, &email, 3600).await?;
        let second = issue_verification_token(&pool, &email, 3600).await?;
        assert_ne!(first, second);

        // The superseded token is gone, not expired.
        assert!(matches!(
            consume_verification_token(&pool, &first).await?,
            ConsumeOutcome::NotFound
        ));
        match consume_verification_token(&pool, &second).await? {
            ConsumeOutcome::Consumed { email: consumed } => assert_eq!(consumed, email),
            other => panic!("expected Consumed, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn token_is_consumed_exactly_once() -> Result<()> {
        let Some(pool) = integration_pool().await? else {
            return Ok(());
        };
        let email = unique_email();
        insert_user(&pool, &email, "$argon2id$stub", "It User").await?;
        let token = issue_verification_token(&pool, &email, 3600).await?;

        assert!(matches!(
            consume_verification_token(&pool, &token).await?,
            ConsumeOutcome::Consumed { .. }
        ));
        assert!(matches!(
            consume_verification_token(&pool, &token).await?,
            ConsumeOutcome::NotFound
        ));
        Ok(())
    }

    #[tokio::test]
    async fn expired_token_is_inert() -> Result<()> {
        let Some(pool) = integration_pool().await? else {
            return Ok(());
        };
        let email = unique_email();
        insert_user(&pool, &email, "$argon2id$stub", "It User").await?;
        let token = issue_verification_token(&pool, &email, 3600).await?;

        sqlx::query(
            "UPDATE verification_tokens SET expires_at = NOW() - INTERVAL '1 minute' \
             WHERE identifier = $1",
        )
        .bind(&email)
        .execute(&pool)
        .await?;

        assert!(matches!(
            consume_verification_token(&pool, &token).await?,
            ConsumeOutcome::Expired
        ));

        // The failed consume mutated nothing: the user stays unverified and
        // the stale row stays in place until superseded.
        let row = sqlx::query(
            "SELECT email_verified_at IS NULL AS unverified FROM users WHERE email = $1",
        )
        .bind(&email)
        .fetch_one(&pool)
        .await?;
        assert!(row.get::<bool, _>("unverified"));

        let row = sqlx::query("SELECT COUNT(*) AS count FROM verification_tokens WHERE token = $1")
            .bind(&token)
            .fetch_one(&pool)
            .await?;
        assert_eq!(row.get::<i64, _>("count"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_without_second_row() -> Result<()> {
        let Some(pool) = integration_pool().await? else {
            return Ok(());
        };
        let email = unique_email();

        assert!(matches!(
            insert_user(&pool, &email, "$argon2id$stub", "It User").await?,
            SignupOutcome::Created
        ));
        assert!(matches!(
            insert_user(&pool, &email, "$argon2id$other", "Other Name").await?,
            SignupOutcome::Conflict
        ));

        let row = sqlx::query("SELECT COUNT(*) AS count FROM users WHERE email = $1")
            .bind(&email)
            .fetch_one(&pool)
            .await?;
        assert_eq!(row.get::<i64, _>("count"), 1);
        Ok(())
    }

    #[test]
    fn signup_outcome_debug_names() {
        assert_eq!(format!("{:?}", SignupOutcome::Created), "Created");
        assert_eq!(format!("{:?}", SignupOutcome::Conflict), "Conflict");
    }

    #[test]
    fn consume_outcome_debug_names() {
        assert_eq!(format!("{:?}", ConsumeOutcome::NotFound), "NotFound");
        assert_eq!(format!("{:?}", ConsumeOutcome::Expired), "Expired");
        assert_eq!(format!("{:?}", ConsumeOutcome::UserNotFound), "UserNotFound");
        let consumed = ConsumeOutcome::Consumed {
            email: "a@example.com".to_string(),
        };
        assert!(format!("{consumed:?}").contains("a@example.com"));
    }

    #[test]
    fn login_record_holds_values() {
        let record = LoginRecord {
            user_id: Uuid::nil(),
            password_hash: "$argon2id$stub".to_string(),
            verified: true,
        };
        assert_eq!(record.user_id, Uuid::nil());
        assert!(record.verified);
    }
}
