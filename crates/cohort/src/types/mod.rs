//! Request model and operator vocabulary.

mod operator;
mod request;

pub use operator::{AttrName, ModifierType, Operator, TemporalMention, TemporalTime};
pub use request::{
    Attribute, Modifier, Operands, SearchGroup, SearchGroupItem, SearchParameter, SearchRequest,
};
