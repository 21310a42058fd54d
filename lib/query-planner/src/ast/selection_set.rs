use std::collections::BTreeSet;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::selection_item::SelectionItem;
use super::value::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionSet {
    pub items: Vec<SelectionItem>,
}

impl SelectionSet {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn variable_usages(&self) -> BTreeSet<String> {
        self.items
            .iter()
            .flat_map(SelectionItem::variable_usages)
            .collect()
    }
}

impl Display for SelectionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.items.is_empty() {
            return Ok(());
        }

        write!(f, "{{")?;
        write!(
            f,
            "{}",
            self.items
                .iter()
                .map(|item| item.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        )?;
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSelection {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub arguments: Vec<(String, Value)>,
    pub selections: SelectionSet,
}

impl FieldSelection {
    /// The key this field occupies in the response object.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn new_leaf(name: impl Into<String>) -> Self {
        FieldSelection {
            name: name.into(),
            alias: None,
            arguments: Vec::new(),
            selections: SelectionSet::default(),
        }
    }

    pub fn variable_usages(&self) -> BTreeSet<String> {
        let mut usages: BTreeSet<String> = self
            .arguments
            .iter()
            .flat_map(|(_, value)| value.variable_usages())
            .collect();
        usages.extend(self.selections.variable_usages());
        usages
    }
}

impl Display for FieldSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(alias) = &self.alias {
            write!(f, "{}: ", alias)?;
        }
        write!(f, "{}", self.name)?;
        if !self.arguments.is_empty() {
            let args: Vec<String> = self
                .arguments
                .iter()
                .map(|(name, value)| format!("{}: {}", name, value))
                .collect();
            write!(f, "({})", args.join(", "))?;
        }
        write!(f, "{}", self.selections)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineFragmentSelection {
    pub type_condition: String,
    pub selections: SelectionSet,
}

impl Display for InlineFragmentSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "... on {}{}", self.type_condition, self.selections)
    }
}

/// A fragment spread with its definition's type condition and selections
/// resolved into the spread at conversion time, so later passes never need a
/// side table of fragment definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentSpreadSelection {
    pub name: String,
    pub type_condition: String,
    pub selections: SelectionSet,
}

impl Display for FragmentSpreadSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "...{}", self.name)
    }
}
