// src/outline.rs
//! The canonical Form 10-K outline every parsed filing is mapped onto.
//!
//! Sections are referred to through [`ItemId`] and [`PartId`], thin handles over
//! the static tables below. A handle can only be obtained through a lookup, so any
//! section stored in a parsed filing is a member of this vocabulary.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug)]
pub struct PartSpec {
    pub ordinal: usize,
    pub id: &'static str,
    pub title: &'static str,
}

#[derive(Debug)]
pub struct ItemSpec {
    /// Position in the canonical filing sequence.
    pub ordinal: usize,
    pub id: &'static str,
    /// Number as printed in headers, e.g. "7A". Empty for Signatures.
    pub number: &'static str,
    pub part: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub purpose: &'static str,
    pub parent: Option<&'static str>,
    pub key_metrics: &'static [&'static str],
    /// Terms a table must mention (at least two of) to be attached to this item.
    /// Empty means any meaningful table is accepted.
    pub table_keywords: &'static [&'static str],
}

const fn spec(
    ordinal: usize,
    id: &'static str,
    number: &'static str,
    part: &'static str,
    title: &'static str,
    description: &'static str,
    purpose: &'static str,
) -> ItemSpec {
    ItemSpec {
        ordinal,
        id,
        number,
        part,
        title,
        description,
        purpose,
        parent: None,
        key_metrics: &[],
        table_keywords: &[],
    }
}

pub static PARTS: [PartSpec; 4] = [
    PartSpec { ordinal: 0, id: "part_1", title: "Part I - Business Information" },
    PartSpec { ordinal: 1, id: "part_2", title: "Part II - Financial Information" },
    PartSpec { ordinal: 2, id: "part_3", title: "Part III - Corporate Governance" },
    PartSpec { ordinal: 3, id: "part_4", title: "Part IV - Exhibits and Signatures" },
];

pub static ITEMS: [ItemSpec; 24] = [
    ItemSpec {
        table_keywords: &["business", "operation", "product", "service", "coverage"],
        ..spec(0, "item_1", "1", "part_1", "Business",
            "Description of the company's operations, segments and strategy",
            "Company operations and strategy")
    },
    ItemSpec {
        parent: Some("item_1"),
        table_keywords: &["risk", "factor", "exposure", "impact"],
        ..spec(1, "item_1a", "1A", "part_1", "Risk Factors",
            "Material risks that could affect the business or its securities",
            "Material risks")
    },
    ItemSpec {
        parent: Some("item_1"),
        ..spec(2, "item_1b", "1B", "part_1", "Unresolved Staff Comments",
            "Open comments from the regulator's staff on prior filings",
            "SEC comments")
    },
    ItemSpec {
        parent: Some("item_1"),
        ..spec(3, "item_1c", "1C", "part_1", "Cybersecurity",
            "Cybersecurity risk management, strategy and governance",
            "Cyber risk management")
    },
    spec(4, "item_2", "2", "part_1", "Properties",
        "Principal physical properties held or leased", "Physical assets"),
    spec(5, "item_3", "3", "part_1", "Legal Proceedings",
        "Material pending legal proceedings", "Material litigation"),
    spec(6, "item_4", "4", "part_1", "Mine Safety Disclosures",
        "Mine safety violations and other regulatory matters",
        "Mining safety (if applicable)"),
    ItemSpec {
        table_keywords: &["share", "stock", "dividend", "repurchase", "market"],
        ..spec(7, "item_5", "5", "part_2", "Market for Common Equity",
            "Market for the registrant's common equity, holders, dividends and repurchases",
            "Stock and shareholder info")
    },
    spec(8, "item_6", "6", "part_2", "Reserved",
        "Reserved by the regulator", "Reserved section"),
    ItemSpec {
        key_metrics: &["combined ratio", "underwriting", "revenue", "margins"],
        table_keywords: &[
            "year ended", "december", "million", "income", "revenue", "expense",
            "prior accident", "development", "catastrophe", "loss", "ratio", "premium",
        ],
        ..spec(9, "item_7", "7", "part_2", "Management's Discussion and Analysis",
            "Management's discussion and analysis of financial condition and results of operations",
            "Financial performance analysis")
    },
    ItemSpec {
        parent: Some("item_7"),
        ..spec(10, "item_7a", "7A", "part_2", "Market Risk Disclosures",
            "Quantitative and qualitative disclosures about market risk",
            "Market risk exposure")
    },
    ItemSpec {
        table_keywords: &["balance sheet", "statement", "cash flow", "equity"],
        ..spec(11, "item_8", "8", "part_2", "Financial Statements",
            "Audited financial statements and supplementary data",
            "Audited financials")
    },
    spec(12, "item_9", "9", "part_2", "Changes in Accountants",
        "Changes in and disagreements with accountants on accounting and financial disclosure",
        "Auditor changes"),
    ItemSpec {
        parent: Some("item_9"),
        ..spec(13, "item_9a", "9A", "part_2", "Controls and Procedures",
            "Disclosure controls and internal control over financial reporting",
            "Internal controls")
    },
    ItemSpec {
        parent: Some("item_9"),
        ..spec(14, "item_9b", "9B", "part_2", "Other Information",
            "Information required to be disclosed but not otherwise reported",
            "Additional disclosures")
    },
    ItemSpec {
        parent: Some("item_9"),
        ..spec(15, "item_9c", "9C", "part_2", "Foreign Jurisdiction Inspections",
            "Disclosure regarding foreign jurisdictions that prevent inspections",
            "Audit inspection issues")
    },
    spec(16, "item_10", "10", "part_3", "Directors and Officers",
        "Directors, executive officers and corporate governance", "Leadership information"),
    spec(17, "item_11", "11", "part_3", "Executive Compensation",
        "Compensation of executive officers and directors", "Pay disclosures"),
    spec(18, "item_12", "12", "part_3", "Security Ownership",
        "Security ownership of beneficial owners and management", "Stock ownership"),
    spec(19, "item_13", "13", "part_3", "Related Transactions",
        "Certain relationships, related transactions and director independence",
        "Related party deals"),
    spec(20, "item_14", "14", "part_3", "Accountant Fees",
        "Principal accountant fees and services", "Auditor compensation"),
    spec(21, "item_15", "15", "part_4", "Exhibits and Schedules",
        "Exhibits and financial statement schedules", "Document index"),
    spec(22, "item_16", "16", "part_4", "Form 10-K Summary",
        "Optional summary of the annual report", "Optional summary"),
    spec(23, "signatures", "", "part_4", "Signatures",
        "Signatures of the registrant and its officers", "Required signatures"),
];

/// Handle to a Part of the outline. Ordered by position in the outline.
#[derive(Clone, Copy)]
pub struct PartId(&'static PartSpec);

/// Handle to an Item of the outline. Ordered by position in the filing sequence.
#[derive(Clone, Copy)]
pub struct ItemId(&'static ItemSpec);

impl PartId {
    pub fn as_str(self) -> &'static str {
        self.0.id
    }

    pub fn title(self) -> &'static str {
        self.0.title
    }

    /// Items of this part in filing order.
    pub fn items(self) -> impl Iterator<Item = ItemId> {
        ITEMS.iter().filter(move |s| s.part == self.0.id).map(ItemId)
    }
}

impl ItemId {
    pub fn as_str(self) -> &'static str {
        self.0.id
    }

    pub fn ordinal(self) -> usize {
        self.0.ordinal
    }

    pub fn number(self) -> &'static str {
        self.0.number
    }

    pub fn title(self) -> &'static str {
        self.0.title
    }

    pub fn description(self) -> &'static str {
        self.0.description
    }

    pub fn purpose(self) -> &'static str {
        self.0.purpose
    }

    pub fn key_metrics(self) -> &'static [&'static str] {
        self.0.key_metrics
    }

    pub fn table_keywords(self) -> &'static [&'static str] {
        self.0.table_keywords
    }

    pub fn part(self) -> PartId {
        // Every item names one of the four parts.
        PARTS
            .iter()
            .find(|p| p.id == self.0.part)
            .map(PartId)
            .unwrap_or(PartId(&PARTS[PARTS.len() - 1]))
    }

    pub fn parent(self) -> Option<ItemId> {
        self.0.parent.and_then(item)
    }

    pub fn is_signatures(self) -> bool {
        self.0.number.is_empty()
    }

    /// Header label as it is usually printed: "ITEM 7A" or "SIGNATURES".
    pub fn label(self) -> String {
        if self.is_signatures() {
            "SIGNATURES".to_string()
        } else {
            format!("ITEM {}", self.0.number)
        }
    }
}

macro_rules! ordinal_handle {
    ($t:ty) => {
        impl PartialEq for $t {
            fn eq(&self, other: &Self) -> bool {
                self.0.ordinal == other.0.ordinal
            }
        }
        impl Eq for $t {}
        impl PartialOrd for $t {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }
        impl Ord for $t {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.ordinal.cmp(&other.0.ordinal)
            }
        }
        impl Hash for $t {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.ordinal.hash(state)
            }
        }
        impl fmt::Debug for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.0.id)
            }
        }
        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.0.id)
            }
        }
        impl Serialize for $t {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.0.id)
            }
        }
    };
}

ordinal_handle!(PartId);
ordinal_handle!(ItemId);

/// Looks up an item by its canonical identifier ("item_7a", "signatures").
pub fn item(id: &str) -> Option<ItemId> {
    ITEMS.iter().find(|s| s.id == id).map(ItemId)
}

/// Looks up a part by its canonical identifier ("part_2").
pub fn part(id: &str) -> Option<PartId> {
    PARTS.iter().find(|p| p.id == id).map(PartId)
}

pub fn parts() -> impl Iterator<Item = PartId> {
    PARTS.iter().map(PartId)
}

/// The canonical filing sequence, Item 1 through Signatures.
pub fn sequence() -> impl Iterator<Item = ItemId> {
    ITEMS.iter().map(ItemId)
}

/// Up to `n` items expected to follow `current` in a filing.
pub fn next_items(current: ItemId, n: usize) -> Vec<ItemId> {
    sequence().skip(current.ordinal() + 1).take(n).collect()
}

static LOOSE_ITEM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:item)?[\s_\-\.]*(\d{1,2})[\s_\-]*([a-z])?\.?$").expect("valid item regex")
});

static LOOSE_PART_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:part)?[\s_\-\.]*(iv|iii|ii|i|[1-4])\.?$").expect("valid part regex")
});

/// Normalises loosely written item identifiers: "Item 7A", "ITEM_7A", "item7a",
/// "7a." and "Signatures" all map onto the outline.
pub fn normalize_item_id(raw: &str) -> Option<ItemId> {
    let lower = raw.trim().to_lowercase();
    if let Some(found) = item(&lower) {
        return Some(found);
    }
    if lower == "signature" || lower == "signatures" {
        return item("signatures");
    }
    let caps = LOOSE_ITEM_RE.captures(&lower)?;
    let number = caps.get(1)?.as_str().trim_start_matches('0');
    let letter = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    item(&format!("item_{}{}", number, letter))
}

/// Normalises loosely written part identifiers: "Part II", "part2", "PART_2", "II".
pub fn normalize_part_id(raw: &str) -> Option<PartId> {
    let lower = raw.trim().to_lowercase();
    if let Some(found) = part(&lower) {
        return Some(found);
    }
    let caps = LOOSE_PART_RE.captures(&lower)?;
    let number = match caps.get(1)?.as_str() {
        "i" | "1" => 1,
        "ii" | "2" => 2,
        "iii" | "3" => 3,
        "iv" | "4" => 4,
        _ => return None,
    };
    part(&format!("part_{}", number))
}

/// Compact outline listing used in oracle prompts.
pub fn outline_summary() -> String {
    let mut lines = Vec::new();
    for p in parts() {
        let labels: Vec<String> = p.items().map(|i| i.label()).collect();
        lines.push(format!("- {} ({}): {}", p.title(), p.as_str(), labels.join(", ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_ordered_by_ordinal() {
        let ids: Vec<usize> = sequence().map(|i| i.ordinal()).collect();
        assert_eq!(ids, (0..ITEMS.len()).collect::<Vec<_>>());
        assert_eq!(sequence().last().map(|i| i.as_str()), Some("signatures"));
    }

    #[test]
    fn test_parents_and_parts_resolve() {
        for item in sequence() {
            assert!(part(item.part().as_str()).is_some(), "{} has unknown part", item);
            if let Some(parent) = item.parent() {
                assert!(parent < item, "parent {} must precede {}", parent, item);
                assert_eq!(parent.part(), item.part());
            }
        }
        assert_eq!(item("item_1a").and_then(|i| i.parent()), item("item_1"));
    }

    #[test]
    fn test_normalize_item_id_variants() {
        let item_7a = item("item_7a");
        assert_eq!(normalize_item_id("Item 7A"), item_7a);
        assert_eq!(normalize_item_id("ITEM_7A"), item_7a);
        assert_eq!(normalize_item_id("item7a"), item_7a);
        assert_eq!(normalize_item_id("7a."), item_7a);
        assert_eq!(normalize_item_id("Item 10"), item("item_10"));
        assert_eq!(normalize_item_id("SIGNATURES"), item("signatures"));
        assert_eq!(normalize_item_id("item 17"), None);
        assert_eq!(normalize_item_id("item 1z"), None);
    }

    #[test]
    fn test_normalize_part_id_variants() {
        assert_eq!(normalize_part_id("Part II"), part("part_2"));
        assert_eq!(normalize_part_id("part2"), part("part_2"));
        assert_eq!(normalize_part_id("PART_4"), part("part_4"));
        assert_eq!(normalize_part_id("iii"), part("part_3"));
        assert_eq!(normalize_part_id("part 5"), None);
    }

    #[test]
    fn test_next_items_and_labels() {
        let item_7 = item("item_7").unwrap();
        let next: Vec<&str> = next_items(item_7, 3).iter().map(|i| i.as_str()).collect();
        assert_eq!(next, vec!["item_7a", "item_8", "item_9"]);
        assert_eq!(item_7.label(), "ITEM 7");
        assert!(next_items(item("signatures").unwrap(), 3).is_empty());
    }
}
