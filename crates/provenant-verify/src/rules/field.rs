//! Field paths naming a statement's resource descriptors.
//!
//! Paths are resolved against a closed set of accessors rather than by
//! reflection. Each supported shape lists its attributes and whether they
//! hold resource descriptors.

use provenant_attest::link::LinkPredicate;
use provenant_attest::{ResourceDescriptor, Statement};

use crate::error::VerificationError;

/// Attributes of the statement itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementAttribute {
    Subject,
    Type,
    PredicateType,
    Predicate,
}

impl StatementAttribute {
    fn lookup(segment: &str) -> Option<Self> {
        match segment {
            // Link attestations record their products as the subject.
            "subject" | "products" => Some(Self::Subject),
            "type" => Some(Self::Type),
            "predicatetype" => Some(Self::PredicateType),
            "predicate" => Some(Self::Predicate),
            _ => None,
        }
    }
}

/// Attributes of a link v0.3 predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkAttribute {
    Materials,
    Name,
    Command,
    Byproducts,
    Environment,
}

impl LinkAttribute {
    fn lookup(segment: &str) -> Option<Self> {
        match segment {
            "materials" => Some(Self::Materials),
            "name" => Some(Self::Name),
            "command" => Some(Self::Command),
            "byproducts" => Some(Self::Byproducts),
            "environment" => Some(Self::Environment),
            _ => None,
        }
    }
}

/// Resolve `field` to the resource descriptors it names.
///
/// A leading `this.` is ignored and segments are compared without regard
/// to case, `_`, or `-`, so `predicateType` and `predicate_type` agree.
pub fn resolve_artifacts(
    statement: &Statement,
    field: &str,
) -> Result<Vec<ResourceDescriptor>, VerificationError> {
    let path = field.strip_prefix("this.").unwrap_or(field);
    let segments: Vec<String> = path.split('.').map(normalize).collect();
    let not_found = || VerificationError::FieldNotFound(field.to_owned());
    let not_a_collection = || VerificationError::FieldNotACollection(field.to_owned());

    match segments.as_slice() {
        [head, attribute] if head == "predicate" => {
            if statement.predicate_type != LinkPredicate::PREDICATE_TYPE {
                return Err(VerificationError::UnsupportedPredicateType(
                    statement.predicate_type.clone(),
                ));
            }
            match LinkAttribute::lookup(attribute).ok_or_else(not_found)? {
                LinkAttribute::Materials => {
                    Ok(LinkPredicate::from_value(&statement.predicate)?.materials)
                }
                LinkAttribute::Name
                | LinkAttribute::Command
                | LinkAttribute::Byproducts
                | LinkAttribute::Environment => Err(not_a_collection()),
            }
        }
        [attribute] => match StatementAttribute::lookup(attribute).ok_or_else(not_found)? {
            StatementAttribute::Subject => Ok(statement.subject.clone()),
            StatementAttribute::Type
            | StatementAttribute::PredicateType
            | StatementAttribute::Predicate => Err(not_a_collection()),
        },
        _ => Err(not_found()),
    }
}

fn normalize(segment: &str) -> String {
    segment
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}
