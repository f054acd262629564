// src/filing/model.rs
use crate::config::DuplicatePolicy;
use crate::outline::{ItemId, PartId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Marker opening the block of visual summaries appended to section content.
pub const VISUAL_BLOCK_MARKER: &str = "[VISUAL CONTENT]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Table,
    /// Charts and other embedded images.
    Chart,
}

impl ElementKind {
    pub fn label(self) -> &'static str {
        match self {
            ElementKind::Table => "Table",
            ElementKind::Chart => "Chart",
        }
    }
}

/// A table or image found inside a section.
#[derive(Debug, Clone, Serialize)]
pub struct VisualElement {
    /// Scoped to the owning section, e.g. "item_7_table_0".
    pub id: String,
    pub section_title: String,
    pub kind: ElementKind,
    pub page_number: Option<u32>,
    pub description: String,
    pub context: String,
    /// Table rows as "cell | cell" lines, or image alt/title text.
    pub extracted_text: Option<String>,
}

/// One regulatory section of a filing.
#[derive(Debug, Clone, Serialize)]
pub struct FilingSection {
    pub section_id: ItemId,
    pub title: String,
    pub description: String,
    pub purpose: String,
    pub content: String,
    pub visual_elements: Vec<VisualElement>,
    pub key_contents: Vec<String>,
    pub page_range: Option<(u32, u32)>,
    /// Child items stored under this one, e.g. Risk Factors under Business.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub subsections: BTreeMap<ItemId, FilingSection>,
}

impl FilingSection {
    /// Builds a section, appending the visual summaries to the narrative content.
    pub fn new(
        section_id: ItemId,
        title: impl Into<String>,
        narrative: String,
        visual_elements: Vec<VisualElement>,
        key_contents: Vec<String>,
    ) -> Self {
        let mut title = title.into();
        if title.trim().is_empty() {
            title = section_id.title().to_string();
        }
        let content = append_visual_summaries(narrative, &visual_elements);
        Self {
            section_id,
            title,
            description: section_id.description().to_string(),
            purpose: section_id.purpose().to_string(),
            content,
            visual_elements,
            key_contents,
            page_range: None,
            subsections: BTreeMap::new(),
        }
    }
}

fn append_visual_summaries(mut content: String, visuals: &[VisualElement]) -> String {
    if visuals.is_empty() {
        return content;
    }
    content.push_str("\n\n");
    content.push_str(VISUAL_BLOCK_MARKER);
    for visual in visuals {
        content.push_str("\n• ");
        content.push_str(&visual.description);
    }
    content
}

#[derive(Debug, Clone, Serialize)]
pub struct PartNode {
    pub part_id: PartId,
    pub title: String,
    /// Top-level items of this part. Child items live in their parent's subsections.
    pub sections: BTreeMap<ItemId, FilingSection>,
}

impl PartNode {
    fn new(part_id: PartId) -> Self {
        Self {
            part_id,
            title: part_id.title().to_string(),
            sections: BTreeMap::new(),
        }
    }
}

/// Result of parsing one filing. Read-only once returned.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedFiling {
    pub filing_url: String,
    /// Characters in the flattened document text.
    pub total_length: usize,
    /// Characters left after pre-processing.
    pub cleaned_length: usize,
    pub chunks_processed: usize,
    pub parts: BTreeMap<PartId, PartNode>,
}

impl ParsedFiling {
    pub fn is_empty(&self) -> bool {
        self.parts.values().all(|p| p.sections.is_empty())
    }

    /// Every section with its canonical path, in Part order then Item order.
    pub fn walk(&self) -> Vec<(String, &FilingSection)> {
        fn visit<'a>(prefix: &str, section: &'a FilingSection, out: &mut Vec<(String, &'a FilingSection)>) {
            let path = format!("{}.{}", prefix, section.section_id);
            out.push((path.clone(), section));
            for child in section.subsections.values() {
                visit(&path, child, out);
            }
        }

        let mut out = Vec::new();
        for part in self.parts.values() {
            for section in part.sections.values() {
                visit(part.part_id.as_str(), section, &mut out);
            }
        }
        out
    }

    pub fn section_count(&self) -> usize {
        self.walk().len()
    }

    /// Finds an item wherever it is stored in the tree.
    pub fn find(&self, item: ItemId) -> Option<&FilingSection> {
        let part = self.parts.get(&item.part())?;
        if let Some(section) = part.sections.get(&item) {
            return Some(section);
        }
        let parent = item.parent()?;
        part.sections.get(&parent)?.subsections.get(&item)
    }
}

/// Accumulates sections across chunks, then nests them into a [`ParsedFiling`].
#[derive(Debug)]
pub struct SectionTree {
    sections: BTreeMap<ItemId, FilingSection>,
    policy: DuplicatePolicy,
}

impl SectionTree {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            sections: BTreeMap::new(),
            policy,
        }
    }

    /// Stores a section, resolving duplicates by the configured policy.
    /// Returns whether the section was kept.
    pub fn insert(&mut self, section: FilingSection) -> bool {
        let id = section.section_id;
        if let Some(existing) = self.sections.get(&id) {
            let replace = match self.policy {
                DuplicatePolicy::LastWins => true,
                DuplicatePolicy::PreferLonger => section.content.len() >= existing.content.len(),
            };
            if !replace {
                tracing::debug!(
                    "Keeping earlier {} ({} chars) over later claim ({} chars)",
                    id,
                    existing.content.len(),
                    section.content.len()
                );
                return false;
            }
            tracing::debug!("Later claim replaces {} ({:?})", id, self.policy);
        }
        self.sections.insert(id, section);
        true
    }

    pub fn finish(
        self,
        filing_url: impl Into<String>,
        total_length: usize,
        cleaned_length: usize,
        chunks_processed: usize,
    ) -> ParsedFiling {
        let present: BTreeSet<ItemId> = self.sections.keys().copied().collect();
        let mut parts: BTreeMap<PartId, PartNode> = BTreeMap::new();
        let mut children = Vec::new();

        for (id, section) in self.sections {
            match id.parent() {
                Some(parent) if present.contains(&parent) => children.push((parent, section)),
                _ => {
                    parts
                        .entry(id.part())
                        .or_insert_with(|| PartNode::new(id.part()))
                        .sections
                        .insert(id, section);
                }
            }
        }

        for (parent, section) in children {
            if let Some(parent_section) = parts
                .get_mut(&parent.part())
                .and_then(|p| p.sections.get_mut(&parent))
            {
                parent_section.subsections.insert(section.section_id, section);
            }
        }

        ParsedFiling {
            filing_url: filing_url.into(),
            total_length,
            cleaned_length,
            chunks_processed,
            parts,
        }
    }
}
