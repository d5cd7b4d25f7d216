//! Field-selection descriptor
//!
//! Callers name the logical (camelCase) fields they will read; the
//! descriptor maps them to physical `anime` columns so field-selective
//! queries project only what is needed. Identity columns are always
//! projected.

use std::collections::BTreeSet;

use tracing::{error, warn};

use crate::error::CatalogError;

/// Logical field name to physical column.
pub const FIELD_COLUMNS: &[(&str, &str)] = &[
    ("id", "id"),
    ("titleEn", "title_en"),
    ("titleJp", "title_jp"),
    ("titleRomaji", "title_romaji"),
    ("titleKanji", "title_kanji"),
    ("titleSynonyms", "title_synonyms"),
    ("description", "synopsis"),
    ("synopsis", "synopsis"),
    ("imageUrl", "image_url"),
    ("episodeCount", "episodes"),
    ("status", "status"),
    ("startDate", "start_date"),
    ("endDate", "end_date"),
    ("tags", "genres"),
    ("genres", "genres"),
    ("duration", "duration"),
    ("broadcast", "broadcast"),
    ("source", "source"),
    ("licensors", "licensors"),
    ("studios", "studios"),
    ("rating", "rating"),
    ("ranking", "ranking"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

/// Columns projected regardless of the selection.
pub const IDENTITY_COLUMNS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Physical column for a logical field name.
#[must_use]
pub fn column_for(field: &str) -> Option<&'static str> {
    FIELD_COLUMNS
        .iter()
        .find(|(logical, _)| *logical == field)
        .map(|(_, column)| *column)
}

/// Set of requested logical fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelection {
    fields: BTreeSet<String>,
}

impl FieldSelection {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Requested fields, sorted.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        self.fields.iter().cloned().collect()
    }

    /// Physical columns for the requested fields, in table order, with the
    /// identity columns first. Unknown fields are skipped.
    #[must_use]
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = IDENTITY_COLUMNS.to_vec();
        for (_, column) in FIELD_COLUMNS {
            let requested = self
                .fields
                .iter()
                .any(|field| column_for(field) == Some(*column));
            if requested && !columns.contains(column) {
                columns.push(column);
            }
        }
        for field in &self.fields {
            if column_for(field).is_none() {
                warn!(field = %field, "Ignoring unknown field in selection");
            }
        }
        columns
    }

    /// `table.col, ...` for the selection, or `table.*` when empty.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` when fields were requested but none of
    /// them maps to a column.
    pub fn try_build_select_clause(&self, table: &str) -> Result<String, CatalogError> {
        if self.is_empty() {
            return Ok(format!("{table}.*"));
        }
        if !self.fields.iter().any(|field| column_for(field).is_some()) {
            return Err(CatalogError::InvariantViolation(format!(
                "field selection {:?} maps to no columns",
                self.fields
            )));
        }
        Ok(self
            .columns()
            .iter()
            .map(|column| format!("{table}.{column}"))
            .collect::<Vec<_>>()
            .join(", "))
    }

    /// Like [`Self::try_build_select_clause`], falling back to `table.*`
    /// (with an error log) when nothing maps.
    #[must_use]
    pub fn build_select_clause(&self, table: &str) -> String {
        self.try_build_select_clause(table).unwrap_or_else(|e| {
            error!(error = %e, "Falling back to full projection");
            format!("{table}.*")
        })
    }
}

impl<S: Into<String>> FromIterator<S> for FieldSelection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_selection_projects_everything() {
        assert_eq!(FieldSelection::default().build_select_clause("a"), "a.*");
    }

    #[test]
    fn test_logical_names_are_mapped() {
        let selection = FieldSelection::new(["description", "episodeCount", "tags", "titleEn"]);
        assert_eq!(
            selection.build_select_clause("a"),
            "a.id, a.created_at, a.updated_at, a.title_en, a.synopsis, a.episodes, a.genres"
        );
    }

    #[test]
    fn test_aliases_do_not_duplicate_columns() {
        let selection = FieldSelection::new(["tags", "genres", "id"]);
        assert_eq!(selection.columns(), vec!["id", "created_at", "updated_at", "genres"]);
    }

    #[test]
    fn test_unmapped_selection_is_invariant_violation() {
        let selection = FieldSelection::new(["bogus"]);
        assert!(matches!(
            selection.try_build_select_clause("a"),
            Err(CatalogError::InvariantViolation(_))
        ));
        assert_eq!(selection.build_select_clause("a"), "a.*");
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let selection = FieldSelection::new(["bogus", "rating"]);
        assert_eq!(
            selection.build_select_clause("anime"),
            "anime.id, anime.created_at, anime.updated_at, anime.rating"
        );
    }
}
