use tablebroker_core::{CoreError, Result};

const MAX_IDENTIFIER_LEN: usize = 63;

/// Builds the DDL issued by the PostgreSQL backend.
///
/// Identifiers are validated and always double-quoted, passwords are emitted
/// as escaped string literals. The table schema is caller-supplied column
/// SQL and is only checked for statement separators and comments.
#[derive(Debug, Clone, Default)]
pub struct SqlStatementService;

impl SqlStatementService {
    pub fn new() -> Self {
        Self
    }

    pub fn create_account_statements(
        &self,
        username: &str,
        password: &str,
        database: &str,
    ) -> Result<Vec<String>> {
        let user = quote_identifier(username)?;
        let database = quote_identifier(database)?;
        Ok(vec![
            format!("CREATE ROLE {user} LOGIN PASSWORD {}", quote_literal(password)),
            format!("GRANT CONNECT ON DATABASE {database} TO {user}"),
            format!("GRANT USAGE, CREATE ON SCHEMA public TO {user}"),
        ])
    }

    pub fn create_container_statement(
        &self,
        container_name: &str,
        schema_definition: &str,
    ) -> Result<String> {
        let table = quote_identifier(container_name)?;
        let schema = validate_schema_definition(schema_definition)?;
        Ok(format!("CREATE TABLE {table} ( {schema} )"))
    }

    pub fn delete_account_statements(&self, username: &str) -> Result<Vec<String>> {
        let user = quote_identifier(username)?;
        Ok(vec![
            format!("DROP OWNED BY {user} CASCADE"),
            format!("DROP ROLE IF EXISTS {user}"),
        ])
    }
}

pub fn validate_identifier(identifier: &str) -> Result<()> {
    let mut chars = identifier.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(CoreError::InvalidParameters(format!(
            "invalid SQL identifier '{identifier}'"
        )));
    }
    Ok(())
}

fn quote_identifier(identifier: &str) -> Result<String> {
    validate_identifier(identifier)?;
    Ok(format!("\"{identifier}\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn validate_schema_definition(schema: &str) -> Result<&str> {
    let trimmed = schema.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidParameters(
            "table schema cannot be empty".to_string(),
        ));
    }
    if trimmed.contains(';') || trimmed.contains("--") || trimmed.contains("/*") {
        return Err(CoreError::InvalidParameters(
            "table schema may not contain statement separators or comments".to_string(),
        ));
    }
    Ok(trimmed)
}
