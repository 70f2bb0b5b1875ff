use std::fmt;

/// Database failures surfaced to the engine.
///
/// `Query` keeps the server-reported SQLSTATE so callers can recognize
/// constraint classes (`23505` unique, `23P01` exclusion) and translate them
/// into domain errors instead of string-matching messages.
#[derive(Debug)]
pub enum DbError {
    /// Could not establish or acquire a connection.
    Connect(String),
    /// A statement failed. `sqlstate` is `None` for client-side failures
    /// (decode errors, pool timeouts, closed pool).
    Query {
        sqlstate: Option<String>,
        message: String,
    },
    /// A migration failed; the ledger was left unchanged for it.
    Migration { name: String, message: String },
}

impl DbError {
    pub fn connect(message: impl Into<String>) -> Self {
        DbError::Connect(message.into())
    }

    pub fn migration(name: impl Into<String>, message: impl Into<String>) -> Self {
        DbError::Migration {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            DbError::Query { sqlstate, .. } => sqlstate.as_deref(),
            _ => None,
        }
    }

    /// True for unique (23505) and exclusion (23P01) violations.
    pub fn is_constraint_conflict(&self) -> bool {
        matches!(self.sqlstate(), Some("23505") | Some("23P01"))
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Connect(msg) => write!(f, "database connect failed: {msg}"),
            DbError::Query {
                sqlstate: Some(code),
                message,
            } => write!(f, "query failed [{code}]: {message}"),
            DbError::Query {
                sqlstate: None,
                message,
            } => write!(f, "query failed: {message}"),
            DbError::Migration { name, message } => {
                write!(f, "migration {name} failed: {message}")
            }
        }
    }
}

impl std::error::Error for DbError {}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        let sqlstate = e
            .as_database_error()
            .and_then(|d| d.code())
            .map(|c| c.to_string());
        DbError::Query {
            sqlstate,
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_conflict_detection() {
        let unique = DbError::Query {
            sqlstate: Some("23505".to_string()),
            message: "duplicate key".to_string(),
        };
        let exclusion = DbError::Query {
            sqlstate: Some("23P01".to_string()),
            message: "conflicting key".to_string(),
        };
        let fk = DbError::Query {
            sqlstate: Some("23503".to_string()),
            message: "fk".to_string(),
        };
        assert!(unique.is_constraint_conflict());
        assert!(exclusion.is_constraint_conflict());
        assert!(!fk.is_constraint_conflict());
        assert!(!DbError::connect("refused").is_constraint_conflict());
    }

    #[test]
    fn display_includes_sqlstate_when_present() {
        let e = DbError::Query {
            sqlstate: Some("42P01".to_string()),
            message: "relation missing".to_string(),
        };
        assert_eq!(e.to_string(), "query failed [42P01]: relation missing");
    }
}
