use crate::ast::selection_item::SelectionItem;
use crate::ast::selection_set::{FieldSelection, SelectionSet};
use crate::routing::BoundaryTypes;
use crate::schema::metadata::SchemaMetadata;

pub const ID_ALIAS: &str = "_id";

/// Renders a selection subtree as single-line GraphQL source for a
/// sub-request. Aliases are preserved, fragment spreads are expanded inline
/// (backends never see the client's fragment names), and selections on
/// boundary types get an `_id: id` alias exactly once so merged results can
/// be keyed by identity.
pub struct SelectionPrinter<'a> {
    metadata: &'a SchemaMetadata,
    boundary_types: &'a BoundaryTypes,
}

impl<'a> SelectionPrinter<'a> {
    pub fn new(metadata: &'a SchemaMetadata, boundary_types: &'a BoundaryTypes) -> Self {
        SelectionPrinter {
            metadata,
            boundary_types,
        }
    }

    pub fn print(&self, parent_type: &str, selection_set: &SelectionSet) -> String {
        self.print_selection_set(parent_type, selection_set)
    }

    fn print_selection_set(&self, parent_type: &str, selection_set: &SelectionSet) -> String {
        let mut parts = Vec::with_capacity(selection_set.items.len() + 1);

        if self.boundary_types.contains(parent_type) && !has_id_alias(selection_set) {
            parts.push(format!("{}: id", ID_ALIAS));
        }

        for item in &selection_set.items {
            match item {
                SelectionItem::Field(field) => parts.push(self.print_field(parent_type, field)),
                SelectionItem::InlineFragment(fragment) => parts.push(format!(
                    "... on {} {}",
                    fragment.type_condition,
                    self.print_selection_set(&fragment.type_condition, &fragment.selections)
                )),
                SelectionItem::FragmentSpread(spread) => parts.push(format!(
                    "... on {} {}",
                    spread.type_condition,
                    self.print_selection_set(&spread.type_condition, &spread.selections)
                )),
            }
        }

        if parts.is_empty() {
            String::new()
        } else {
            format!("{{ {} }}", parts.join(" "))
        }
    }

    fn print_field(&self, parent_type: &str, field: &FieldSelection) -> String {
        let mut rendered = String::new();
        if let Some(alias) = &field.alias {
            rendered.push_str(alias);
            rendered.push_str(": ");
        }
        rendered.push_str(&field.name);

        if !field.arguments.is_empty() {
            let args: Vec<String> = field
                .arguments
                .iter()
                .map(|(name, value)| format!("{}: {}", name, value))
                .collect();
            rendered.push('(');
            rendered.push_str(&args.join(", "));
            rendered.push(')');
        }

        let field_type = self
            .metadata
            .field_type(parent_type, &field.name)
            .map(|type_node| type_node.inner_name().to_string());
        let needs_subset = !field.selections.is_empty()
            || field_type
                .as_deref()
                .is_some_and(|name| self.boundary_types.contains(name));
        if needs_subset {
            if let Some(field_type) = field_type {
                let subset = self.print_selection_set(&field_type, &field.selections);
                if !subset.is_empty() {
                    rendered.push(' ');
                    rendered.push_str(&subset);
                }
            }
        }

        rendered
    }
}

fn has_id_alias(selection_set: &SelectionSet) -> bool {
    selection_set.items.iter().any(|item| {
        matches!(item, SelectionItem::Field(field) if field.response_key() == ID_ALIAS)
    })
}
