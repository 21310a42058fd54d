use std::fmt::Display;

use graphql_parser::query::Type as ParserType;
use serde::{Deserialize, Serialize};

/// The wrapper algebra of a GraphQL type reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeNode {
    Named(String),
    NonNull(Box<TypeNode>),
    List(Box<TypeNode>),
}

impl TypeNode {
    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeNode::NonNull(_))
    }

    /// The innermost named type, through any list/non-null wrappers.
    pub fn inner_name(&self) -> &str {
        match self {
            TypeNode::Named(name) => name,
            TypeNode::NonNull(inner) | TypeNode::List(inner) => inner.inner_name(),
        }
    }
}

impl From<&ParserType<'_, String>> for TypeNode {
    fn from(parser_type: &ParserType<'_, String>) -> Self {
        match parser_type {
            ParserType::NamedType(name) => TypeNode::Named(name.clone()),
            ParserType::NonNullType(inner) => TypeNode::NonNull(Box::new(inner.as_ref().into())),
            ParserType::ListType(inner) => TypeNode::List(Box::new(inner.as_ref().into())),
        }
    }
}

impl Display for TypeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeNode::Named(name) => write!(f, "{}", name),
            TypeNode::NonNull(inner) => write!(f, "{}!", inner),
            TypeNode::List(inner) => write!(f, "[{}]", inner),
        }
    }
}
