// ABOUTME: Utility functions for identifier validation, quoting and reporting
// ABOUTME: Provides tool discovery, SQL identifier helpers and elapsed-time formatting

use anyhow::{bail, Result};
use std::time::Duration;
use which::which;

/// Check that an external program is available on PATH
///
/// # Errors
///
/// Returns an error with installation hints if the program cannot be found.
///
/// # Examples
///
/// ```no_run
/// # use catalog_sync::utils::check_required_tool;
/// # fn example() -> anyhow::Result<()> {
/// check_required_tool("ogr2ogr")?;
/// # Ok(())
/// # }
/// ```
pub fn check_required_tool(program: &str) -> Result<()> {
    if which(program).is_err() {
        bail!(
            "Missing required program: {}\n\
             \n\
             The transfer engine needs GDAL's command line tools:\n\
             - Ubuntu/Debian: sudo apt-get install gdal-bin\n\
             - macOS: brew install gdal\n\
             - Conda: conda install -c conda-forge gdal",
            program
        );
    }

    Ok(())
}

/// Validate a PostgreSQL identifier (schema, table, column)
///
/// Identifiers must:
/// - Be 1-63 characters long
/// - Start with a letter or underscore
/// - Contain only letters, digits and underscores
///
/// # Examples
///
/// ```
/// # use catalog_sync::utils::validate_postgres_identifier;
/// # use anyhow::Result;
/// # fn example() -> Result<()> {
/// validate_postgres_identifier("address_points")?;
/// validate_postgres_identifier("_private")?;
///
/// assert!(validate_postgres_identifier("123roads").is_err());
/// assert!(validate_postgres_identifier("land-ownership").is_err());
/// # Ok(())
/// # }
/// ```
pub fn validate_postgres_identifier(identifier: &str) -> Result<()> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        bail!("Identifier cannot be empty or whitespace-only");
    }

    // PostgreSQL limit
    if trimmed.len() > 63 {
        bail!(
            "Identifier '{}' exceeds maximum length of 63 characters (got {})",
            sanitize_identifier(trimmed),
            trimmed.len()
        );
    }

    let mut chars = trimmed.chars();
    if let Some(first_char) = chars.next() {
        if !first_char.is_ascii_alphabetic() && first_char != '_' {
            bail!(
                "Identifier '{}' must start with a letter or underscore, not '{}'",
                sanitize_identifier(trimmed),
                first_char
            );
        }
    }

    for (i, c) in trimmed.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' {
            bail!(
                "Identifier '{}' contains invalid character '{}' at position {}. \
                 Only letters, digits, and underscores are allowed",
                sanitize_identifier(trimmed),
                if c.is_control() {
                    format!("\\x{:02x}", c as u32)
                } else {
                    c.to_string()
                },
                i
            );
        }
    }

    Ok(())
}

/// Sanitize an identifier for display
///
/// Removes control characters and limits length to 100 characters so names
/// read from remote catalogs cannot inject into logs.
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Quote a PostgreSQL identifier
///
/// Escapes embedded quotes and wraps the identifier in double quotes.
pub fn quote_ident(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('"');
    for ch in identifier.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Quote a SQL Server identifier with brackets
///
/// # Examples
///
/// ```
/// use catalog_sync::utils::quote_mssql_ident;
/// assert_eq!(quote_mssql_ident("AGOLITEMS"), "[AGOLITEMS]");
/// assert_eq!(quote_mssql_ident("odd]name"), "[odd]]name]");
/// ```
pub fn quote_mssql_ident(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('[');
    for ch in identifier.chars() {
        if ch == ']' {
            quoted.push(']');
        }
        quoted.push(ch);
    }
    quoted.push(']');
    quoted
}

/// Quote a dotted SQL Server object name part by part (`SGID.META.AGOLITEMS`).
pub fn quote_mssql_object(name: &str) -> String {
    name.split('.')
        .map(quote_mssql_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// Human-friendly elapsed time for completion messages
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// use catalog_sync::utils::format_elapsed;
/// assert_eq!(format_elapsed(Duration::from_millis(1500)), "1500 ms");
/// assert_eq!(format_elapsed(Duration::from_secs(45)), "45.00 seconds");
/// assert_eq!(format_elapsed(Duration::from_secs(600)), "10.00 minutes");
/// assert_eq!(format_elapsed(Duration::from_secs(3 * 3600)), "3.00 hours");
/// ```
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs_f64();
    let minute = 60.0;
    let hour = 60.0 * minute;

    if seconds < 30.0 {
        return format!("{} ms", elapsed.as_millis());
    }

    if seconds < 90.0 {
        return format!("{:.2} seconds", seconds);
    }

    if seconds < 90.0 * minute {
        return format!("{:.2} minutes", seconds / minute);
    }

    format!("{:.2} hours", seconds / hour)
}

/// "1 table" / "3 tables"
pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}
