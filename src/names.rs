// ABOUTME: Qualified table names and the source-to-destination naming rules
// ABOUTME: Splits catalog.schema.table identifiers and slugs human titles

use anyhow::Result;
use std::fmt;

use crate::error::SyncError;

/// A schema and table pair identifying a table within one catalog.
///
/// Both parts are lower-cased on construction, so equality, ordering and
/// hashing compare the normalized components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedTableName {
    schema: String,
    table: String,
}

impl QualifiedTableName {
    pub fn new(schema: &str, table: &str) -> Self {
        Self {
            schema: schema.trim().to_lowercase(),
            table: table.trim().to_lowercase(),
        }
    }

    /// Parse `schema.table` or `catalog.schema.table`.
    pub fn parse(identifier: &str) -> Result<Self> {
        let parts: Vec<&str> = identifier.trim().split('.').collect();

        let (schema, table) = match parts.as_slice() {
            [schema, table] => (*schema, *table),
            [_catalog, schema, table] => (*schema, *table),
            _ => return Err(SyncError::MalformedIdentifier(identifier.to_string()).into()),
        };

        if schema.trim().is_empty() || table.trim().is_empty() {
            return Err(SyncError::MalformedIdentifier(identifier.to_string()).into());
        }

        Ok(Self::new(schema, table))
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The same schema with a different table name.
    pub fn with_table(&self, table: &str) -> Self {
        Self::new(&self.schema, table)
    }

    /// SQL form used in DDL: `schema."table"`.
    pub fn to_sql(&self) -> String {
        format!(
            "{}.{}",
            crate::utils::quote_ident(&self.schema),
            crate::utils::quote_ident(&self.table)
        )
    }
}

impl fmt::Display for QualifiedTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Converts between source identifiers and destination names.
///
/// Titles in the metadata table are human readable ("Utah Wildlife Overlay")
/// and become destination table names ("wildlife_overlay").
#[derive(Debug, Clone)]
pub struct NameMapper {
    /// Matched against the lower-cased title as `"<word> "` at the very start.
    region_prefix: String,
}

impl NameMapper {
    pub fn new(region_word: &str) -> Self {
        let word = region_word.trim().to_lowercase();
        let region_prefix = if word.is_empty() {
            String::new()
        } else {
            format!("{} ", word)
        };

        Self { region_prefix }
    }

    pub fn split(&self, identifier: &str) -> Result<QualifiedTableName> {
        QualifiedTableName::parse(identifier)
    }

    /// Turn a human title into a destination table name.
    ///
    /// Lower-cases, strips the region word once when it leads the title, and
    /// replaces spaces with underscores. Returns `None` for missing or empty
    /// titles. Applying it to its own output returns the same value.
    pub fn slug(&self, title: Option<&str>) -> Option<String> {
        let title = title?;
        let lowered = title.to_lowercase();

        let stripped: &str = if !self.region_prefix.is_empty() {
            lowered
                .strip_prefix(self.region_prefix.as_str())
                .unwrap_or(lowered.as_str())
        } else {
            lowered.as_str()
        };

        let slug = stripped.replace(' ', "_");
        if slug.is_empty() {
            return None;
        }

        tracing::trace!("updating {} to {}", title, slug);

        Some(slug)
    }
}

impl Default for NameMapper {
    fn default() -> Self {
        Self::new("utah")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_three_part_identifier() {
        let name = QualifiedTableName::parse("SGID.ENVIRONMENT.DAQPermitCompApproval").unwrap();
        assert_eq!(name.schema(), "environment");
        assert_eq!(name.table(), "daqpermitcompapproval");
    }

    #[test]
    fn test_parse_two_part_identifier() {
        let name = QualifiedTableName::parse("Water.Lakes").unwrap();
        assert_eq!(name.to_string(), "water.lakes");
    }

    #[test]
    fn test_parse_rejects_other_segment_counts() {
        for bad in ["lakes", "a.b.c.d", "", "water.", ".lakes"] {
            let err = QualifiedTableName::parse(bad).unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<SyncError>(),
                    Some(SyncError::MalformedIdentifier(_))
                ),
                "expected malformed identifier for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_equality_is_case_insensitive() {
        assert_eq!(
            QualifiedTableName::new("Location", "Address_Points"),
            QualifiedTableName::new("location", "address_points")
        );
    }

    #[test]
    fn test_to_sql_quotes_both_parts() {
        let name = QualifiedTableName::new("cadastre", "land_ownership");
        assert_eq!(name.to_sql(), "\"cadastre\".\"land_ownership\"");
    }

    #[test]
    fn test_slug_strips_leading_region_word() {
        let mapper = NameMapper::default();
        assert_eq!(
            mapper.slug(Some("Utah Retail Culinary Water Service Areas")),
            Some("retail_culinary_water_service_areas".to_string())
        );
    }

    #[test]
    fn test_slug_keeps_titles_without_region_word() {
        let mapper = NameMapper::default();
        assert_eq!(
            mapper.slug(Some("Wildlife Overlay")),
            Some("wildlife_overlay".to_string())
        );
    }

    #[test]
    fn test_slug_leaves_region_word_mid_title() {
        let mapper = NameMapper::default();
        assert_eq!(
            mapper.slug(Some("Southern Utah Parks")),
            Some("southern_utah_parks".to_string())
        );
    }

    #[test]
    fn test_slug_strips_region_word_once() {
        let mapper = NameMapper::default();
        assert_eq!(
            mapper.slug(Some("Utah Utah Lake Shoreline")),
            Some("utah_lake_shoreline".to_string())
        );
    }

    #[test]
    fn test_slug_requires_trailing_space_after_region_word() {
        let mapper = NameMapper::default();
        assert_eq!(mapper.slug(Some("Utahns")), Some("utahns".to_string()));
        assert_eq!(mapper.slug(Some("Utah")), Some("utah".to_string()));
    }

    #[test]
    fn test_slug_empty_and_missing_titles() {
        let mapper = NameMapper::default();
        assert_eq!(mapper.slug(None), None);
        assert_eq!(mapper.slug(Some("")), None);
        assert_eq!(mapper.slug(Some("Utah ")), None);
    }

    #[test]
    fn test_slug_is_idempotent() {
        let mapper = NameMapper::default();
        let titles = [
            "Utah Wildlife Overlay",
            "Utah Utah Lake Shoreline",
            "utah_roads",
            "Southern Utah Parks",
            "ALREADY_SLUGGED",
            "  Leading Spaces",
            "Utah",
        ];

        for title in titles {
            let once = mapper.slug(Some(title));
            let twice = mapper.slug(once.as_deref());
            assert_eq!(once, twice, "slug not idempotent for {:?}", title);
        }
    }

    #[test]
    fn test_custom_region_word() {
        let mapper = NameMapper::new("Nevada");
        assert_eq!(
            mapper.slug(Some("Nevada Counties")),
            Some("counties".to_string())
        );
        assert_eq!(
            mapper.slug(Some("Utah Counties")),
            Some("utah_counties".to_string())
        );
    }
}
