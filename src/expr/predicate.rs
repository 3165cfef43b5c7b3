//! Dynamic predicate composition
//!
//! Search screens build filters from optional inputs. Every helper here
//! accepts `Option<Predicate>` and drops the `None`s.

use super::{BooleanExpression, Predicate};

/// AND together every present predicate; `None` when nothing is present.
pub fn all_of<I>(predicates: I) -> Option<Predicate>
where
    I: IntoIterator<Item = Option<Predicate>>,
{
    predicates
        .into_iter()
        .flatten()
        .reduce(|acc, next| acc.and(next))
}

/// OR together every present predicate; `None` when nothing is present.
pub fn any_of<I>(predicates: I) -> Option<Predicate>
where
    I: IntoIterator<Item = Option<Predicate>>,
{
    predicates
        .into_iter()
        .flatten()
        .reduce(|acc, next| acc.or(next))
}

/// Accumulates optional predicates.
#[derive(Debug, Clone, Default)]
pub struct PredicateBuilder {
    current: Option<Predicate>,
}

impl PredicateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, predicate: impl Into<Option<Predicate>>) -> Self {
        if let Some(next) = predicate.into() {
            self.current = Some(match self.current.take() {
                Some(current) => current.and(next),
                None => next,
            });
        }
        self
    }

    pub fn or(mut self, predicate: impl Into<Option<Predicate>>) -> Self {
        if let Some(next) = predicate.into() {
            self.current = Some(match self.current.take() {
                Some(current) => current.or(next),
                None => next,
            });
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn build(self) -> Option<Predicate> {
        self.current
    }
}
