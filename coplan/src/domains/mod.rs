//! Built-in planning domains, selectable by name from the CLI.

use crate::core::domain::Domain;
use crate::core::error::PlanError;

pub mod prepare_dinner;

/// Names of the domains [`by_name`] knows, sorted.
pub fn names() -> Vec<&'static str> {
    vec![prepare_dinner::NAME]
}

/// Build a built-in domain with its default agendas.
pub fn by_name(name: &str) -> Option<Result<Domain, PlanError>> {
    match name {
        prepare_dinner::NAME => Some(prepare_dinner::domain()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_domain_builds() {
        for name in names() {
            let domain = by_name(name).expect("listed").expect("build");
            assert_eq!(domain.name, name);
        }
        assert!(by_name("nowhere").is_none());
    }
}
