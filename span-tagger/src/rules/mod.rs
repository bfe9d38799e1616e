//! Attachment rules
//!
//! A rule declares that an institution is entitled to a collection of a data
//! provider, either unconditionally or subject to a holdings file. Rules are
//! read from the rule store ([`store`]) and memoized per
//! `(source, collection set)` by the [`RuleMatcher`].

use span_common::{Error, Result};
use std::fmt;

pub mod matcher;
pub mod store;

pub use matcher::{match_key, MatchKey, RuleMatcher};
pub use store::{connect_readonly, RuleStore, SqliteRuleStore};

/// Raw rule row as stored; NULL columns decode to `None`
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct RuleRow {
    pub isil: Option<String>,
    pub sid: Option<String>,
    pub tcid: Option<String>,
    pub mc: Option<String>,
    pub hflink: Option<String>,
    pub hfeval: Option<String>,
    pub cflink: Option<String>,
    pub cfelink: Option<String>,
}

/// The rule's "evaluate holdings" flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluateHoldings {
    Yes,
    No,
    Absent,
}

impl EvaluateHoldings {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" => Some(Self::Absent),
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            _ => None,
        }
    }
}

/// How a rule decides whether its institution is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentMode {
    /// Every matching record gets the label
    Unconditional,
    /// Only records covered by this holdings file get the label
    Holdings(String),
    /// Content file only; content files are not evaluated, nothing is attached
    ContentFile(String),
}

/// Validated attachment rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRule {
    pub institution: String,
    pub source_id: String,
    pub technical_collection_id: String,
    pub mega_collection: String,
    pub mode: AttachmentMode,
    pub external_content_link: Option<String>,
}

impl fmt::Display for AttachmentRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (sid={}, mc={:?}, tcid={:?})",
            self.institution, self.source_id, self.mega_collection, self.technical_collection_id
        )
    }
}

fn text(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

impl TryFrom<RuleRow> for AttachmentRule {
    type Error = Error;

    fn try_from(row: RuleRow) -> Result<Self> {
        let institution = text(row.isil);
        let source_id = text(row.sid);
        let technical_collection_id = text(row.tcid);
        let mega_collection = text(row.mc);
        let hflink = text(row.hflink);
        let cflink = text(row.cflink);
        let raw_eval = text(row.hfeval);

        let rule_error = |reason: String| Error::Rule {
            rule: format!(
                "{} (sid={}, mc={:?}, tcid={:?})",
                institution, source_id, mega_collection, technical_collection_id
            ),
            reason,
        };

        if institution.is_empty() {
            return Err(rule_error("missing institution".to_string()));
        }

        let evaluate = EvaluateHoldings::parse(&raw_eval)
            .ok_or_else(|| rule_error(format!("invalid evaluate-holdings flag {:?}", raw_eval)))?;

        let mode = match (evaluate, hflink.is_empty(), cflink.is_empty()) {
            (EvaluateHoldings::No, false, _) => {
                return Err(rule_error(format!(
                    "holdings file {} given but evaluation disabled",
                    hflink
                )))
            }
            (EvaluateHoldings::Yes, false, _) => AttachmentMode::Holdings(hflink),
            (EvaluateHoldings::No, true, _) => AttachmentMode::Unconditional,
            // A holdings link without an evaluation flag is not evaluated
            (EvaluateHoldings::Yes | EvaluateHoldings::Absent, _, false) => {
                AttachmentMode::ContentFile(cflink)
            }
            _ => return Err(rule_error("no attachment mode applies".to_string())),
        };

        let external = text(row.cfelink);
        Ok(Self {
            institution,
            source_id,
            technical_collection_id,
            mega_collection,
            mode,
            external_content_link: (!external.is_empty()).then_some(external),
        })
    }
}
