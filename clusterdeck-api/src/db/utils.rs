/// SQLSTATE raised by Postgres when a unique constraint is violated.
const UNIQUE_VIOLATION: &str = "23505";

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}
