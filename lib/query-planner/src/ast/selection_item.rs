use std::collections::BTreeSet;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::selection_set::{
    FieldSelection, FragmentSpreadSelection, InlineFragmentSelection, SelectionSet,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SelectionItem {
    Field(FieldSelection),
    InlineFragment(InlineFragmentSelection),
    FragmentSpread(FragmentSpreadSelection),
}

impl SelectionItem {
    pub fn selection_set(&self) -> &SelectionSet {
        match self {
            SelectionItem::Field(field) => &field.selections,
            SelectionItem::InlineFragment(fragment) => &fragment.selections,
            SelectionItem::FragmentSpread(spread) => &spread.selections,
        }
    }

    pub fn is_field(&self) -> bool {
        matches!(self, SelectionItem::Field(_))
    }

    pub fn variable_usages(&self) -> BTreeSet<String> {
        match self {
            SelectionItem::Field(field) => field.variable_usages(),
            SelectionItem::InlineFragment(fragment) => fragment.selections.variable_usages(),
            SelectionItem::FragmentSpread(spread) => spread.selections.variable_usages(),
        }
    }
}

impl Display for SelectionItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionItem::Field(field) => write!(f, "{}", field),
            SelectionItem::InlineFragment(fragment) => write!(f, "{}", fragment),
            SelectionItem::FragmentSpread(spread) => write!(f, "{}", spread),
        }
    }
}
