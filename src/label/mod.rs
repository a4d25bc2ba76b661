//! # Label Descriptions
//!
//! The fully-resolved description of one kitchen label: what to print, not
//! how. Ingredient and allergen lookup happens before a description reaches
//! this crate, so everything here is plain data plus validation.
//!
//! ## Variants
//!
//! | Variant | Banner | Layout |
//! |---------|--------|--------|
//! | `prep` | PREP | compact unless `labelHeight` says otherwise |
//! | `cooked` | COOKED | compact unless `labelHeight` says otherwise |
//! | `default` | none | compact unless `labelHeight` says otherwise |
//! | `ppds` | PPDS | always extended, needs storage info and business name |

pub mod request;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::MiseError;

pub use request::{LabelSizeMm, PrintRequest, PrintResponse, PrinterSpec, ResponseDimensions};

/// Which product a label is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelKind {
    IngredientLabel,
    MenuItemLabel,
}

/// Label format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelVariant {
    Prep,
    Cooked,
    /// Prepacked for direct sale: full ingredient disclosure with allergens
    /// emphasised, storage instructions and business identification.
    Ppds,
    #[default]
    Default,
}

impl LabelVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prep => "prep",
            Self::Cooked => "cooked",
            Self::Ppds => "ppds",
            Self::Default => "default",
        }
    }

    /// Text of the inverted banner at the top of the label.
    pub fn banner(&self) -> Option<&'static str> {
        match self {
            Self::Prep => Some("PREP"),
            Self::Cooked => Some("COOKED"),
            Self::Ppds => Some("PPDS"),
            Self::Default => None,
        }
    }
}

/// Layout height. Extended labels carry the full ingredient list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelHeight {
    #[default]
    Compact,
    Extended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allergen {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IngredientId {
    Number(u64),
    Text(String),
}

/// An ingredient resolved by the catalogue, with its allergens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: IngredientId,
    pub name: String,
    #[serde(default)]
    pub allergens: Vec<Allergen>,
}

/// One line of the ingredient list as it will be printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientLine {
    pub name: String,
    /// Printed in bold on extended labels.
    pub contains_allergen: bool,
}

/// # Label Description
///
/// Created per print request, validated, rendered once and discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelDescription {
    pub kind: LabelKind,
    /// Caller-supplied identifier, echoed in render failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub all_ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub allergens: Vec<Allergen>,
    pub printed_on: String,
    pub expiry_date: String,
    #[serde(default)]
    pub label_variant: LabelVariant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_height: Option<LabelHeight>,
    /// Initials of whoever prepped or cooked the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepared_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
}

impl LabelDescription {
    /// Minimal ingredient label, mostly for tests and the CLI.
    pub fn new(name: impl Into<String>, printed_on: &str, expiry_date: &str) -> Self {
        Self {
            kind: LabelKind::IngredientLabel,
            id: None,
            name: name.into(),
            ingredients: Vec::new(),
            all_ingredients: Vec::new(),
            allergens: Vec::new(),
            printed_on: printed_on.to_string(),
            expiry_date: expiry_date.to_string(),
            label_variant: LabelVariant::Default,
            label_height: None,
            prepared_by: None,
            storage_info: None,
            business_name: None,
        }
    }

    /// Identifier used in error reports: the explicit id, else the name.
    pub fn label_id(&self) -> &str {
        match &self.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => &self.name,
        }
    }

    pub fn is_ppds(&self) -> bool {
        self.label_variant == LabelVariant::Ppds
    }

    /// PPDS labels are always extended; otherwise the explicit request wins.
    pub fn effective_height(&self) -> LabelHeight {
        if self.is_ppds() {
            LabelHeight::Extended
        } else {
            self.label_height.unwrap_or_default()
        }
    }

    /// Allergen names, de-duplicated case-insensitively in first-seen order.
    ///
    /// Explicit `allergens` come first, followed by those attached to
    /// resolved ingredients.
    pub fn allergen_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let explicit = self.allergens.iter();
        let nested = self.all_ingredients.iter().flat_map(|i| i.allergens.iter());

        for allergen in explicit.chain(nested) {
            let name = allergen.name.trim();
            if name.is_empty() {
                continue;
            }
            if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Ingredient list for printing.
    ///
    /// Resolved ingredients are preferred; plain `ingredients` strings are
    /// used when no resolved list was supplied, and are flagged when their
    /// text mentions one of the label's allergens.
    pub fn ingredient_lines(&self) -> Vec<IngredientLine> {
        if !self.all_ingredients.is_empty() {
            return self
                .all_ingredients
                .iter()
                .map(|i| IngredientLine {
                    name: i.name.trim().to_string(),
                    contains_allergen: !i.allergens.is_empty(),
                })
                .collect();
        }

        let allergens: Vec<String> = self
            .allergen_names()
            .iter()
            .map(|a| a.to_lowercase())
            .collect();
        self.ingredients
            .iter()
            .map(|i| i.trim())
            .filter(|i| !i.is_empty())
            .map(|i| {
                let lower = i.to_lowercase();
                IngredientLine {
                    name: i.to_string(),
                    contains_allergen: allergens.iter().any(|a| lower.contains(a.as_str())),
                }
            })
            .collect()
    }

    /// Printed-on date formatted for the label.
    pub fn printed_on_display(&self) -> Result<String, String> {
        LabelDate::parse(&self.printed_on).map(|d| d.display())
    }

    /// Expiry date formatted for the label.
    pub fn expiry_display(&self) -> Result<String, String> {
        LabelDate::parse(&self.expiry_date).map(|d| d.display())
    }

    /// Reject malformed or incomplete descriptions.
    ///
    /// Runs before any rendering work: PPDS without storage instructions or
    /// business name, blank names and unparseable dates are all caller errors.
    pub fn validate(&self) -> Result<(), MiseError> {
        if self.name.trim().is_empty() {
            return Err(MiseError::Validation("Label name is required".into()));
        }

        if self.is_ppds() {
            if is_blank(&self.storage_info) {
                return Err(MiseError::Validation(
                    "PPDS labels require storage instructions (storageInfo)".into(),
                ));
            }
            if is_blank(&self.business_name) {
                return Err(MiseError::Validation(
                    "PPDS labels require a business name (businessName)".into(),
                ));
            }
        }

        let printed = LabelDate::parse(&self.printed_on)
            .map_err(|e| MiseError::Validation(format!("printedOn: {}", e)))?;
        let expiry = LabelDate::parse(&self.expiry_date)
            .map_err(|e| MiseError::Validation(format!("expiryDate: {}", e)))?;
        if expiry.instant() < printed.instant() {
            return Err(MiseError::Validation(format!(
                "Expiry date {} is before the printed date {}",
                self.expiry_date, self.printed_on
            )));
        }

        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|s| s.trim().is_empty())
}

/// A date string as accepted on labels: RFC 3339 timestamp, or `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LabelDate {
    Timestamp(NaiveDateTime),
    Day(NaiveDate),
}

impl LabelDate {
    fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            // Keep the wall-clock time the caller sent; the label shows the
            // kitchen's local time, not the server's.
            return Ok(Self::Timestamp(dt.naive_local()));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
            return Ok(Self::Timestamp(dt));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
            return Ok(Self::Timestamp(dt));
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self::Day(d));
        }
        Err(format!("'{}' is not a date (expected YYYY-MM-DD or RFC 3339)", s))
    }

    fn instant(&self) -> NaiveDateTime {
        match self {
            Self::Timestamp(dt) => *dt,
            Self::Day(d) => d.and_time(NaiveTime::MIN),
        }
    }

    fn display(&self) -> String {
        match self {
            Self::Timestamp(dt) => dt.format("%d/%m/%Y %H:%M").to_string(),
            Self::Day(d) => d.format("%d/%m/%Y").to_string(),
        }
    }
}
