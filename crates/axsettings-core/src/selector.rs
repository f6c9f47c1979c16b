//! Selector parsing for finding UI elements
//!
//! Syntax:
//!   role:CheckBox                 - role match (with or without the AX prefix)
//!   id:AX_INCREASE_CONTRAST       - exact identifier match
//!   title:Zoom                    - exact title match
//!   title~:contrast               - title contains, case-insensitive
//!   title^:Accessibility          - title prefix
//!   desc:Back                     - description
//!   value:1                       - value rendered as text
//!   role:Button AND desc:Back     - compound selector

use crate::element::{Role, UIElement};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub attr: Field,
    pub op: MatchOp,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Role,
    Identifier,
    Title,
    Description,
    Value,
    /// Title or description, whichever the control exposes.
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOp {
    Equals,
    Contains,
    Prefix,
}

impl Selector {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::selector_invalid(s, "empty selector"));
        }

        let conditions = s
            .split(" AND ")
            .map(|part| Condition::parse(part.trim()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { conditions })
    }

    fn single(attr: Field, op: MatchOp, value: impl Into<String>) -> Self {
        Self {
            conditions: vec![Condition {
                attr,
                op,
                value: value.into(),
            }],
        }
    }

    pub fn role(role: &Role) -> Self {
        Self::single(Field::Role, MatchOp::Equals, role.name())
    }

    pub fn identifier(id: &str) -> Self {
        Self::single(Field::Identifier, MatchOp::Equals, id)
    }

    pub fn title(title: &str) -> Self {
        Self::single(Field::Title, MatchOp::Equals, title)
    }

    pub fn title_prefix(prefix: &str) -> Self {
        Self::single(Field::Title, MatchOp::Prefix, prefix)
    }

    pub fn description(desc: &str) -> Self {
        Self::single(Field::Description, MatchOp::Equals, desc)
    }

    pub fn label(label: &str) -> Self {
        Self::single(Field::Label, MatchOp::Equals, label)
    }

    pub fn value(value: &str) -> Self {
        Self::single(Field::Value, MatchOp::Equals, value)
    }

    pub fn and(mut self, other: Selector) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    pub fn matches(&self, element: &UIElement) -> bool {
        self.conditions.iter().all(|c| c.matches(element))
    }
}

impl Condition {
    pub fn parse(s: &str) -> Result<Self> {
        let (attr_str, rest) = s.split_once(':').ok_or_else(|| {
            Error::selector_invalid(
                s,
                "expected format 'attr:value', 'attr~:value' or 'attr^:value'",
            )
        })?;

        let (attr, op) = if let Some(a) = attr_str.strip_suffix('~') {
            (a, MatchOp::Contains)
        } else if let Some(a) = attr_str.strip_suffix('^') {
            (a, MatchOp::Prefix)
        } else {
            (attr_str, MatchOp::Equals)
        };

        let attr = match attr.to_lowercase().as_str() {
            "role" => Field::Role,
            "id" | "identifier" => Field::Identifier,
            "title" => Field::Title,
            "desc" | "description" => Field::Description,
            "value" => Field::Value,
            "label" | "name" => Field::Label,
            _ => {
                return Err(Error::selector_invalid(
                    s,
                    &format!("unknown attribute '{}'", attr),
                ))
            }
        };

        if rest.is_empty() {
            return Err(Error::selector_invalid(s, "empty value"));
        }

        Ok(Self {
            attr,
            op,
            value: rest.to_string(),
        })
    }

    fn test(&self, target: &str) -> bool {
        match self.op {
            MatchOp::Equals => target == self.value,
            MatchOp::Contains => target.to_lowercase().contains(&self.value.to_lowercase()),
            MatchOp::Prefix => target.starts_with(&self.value),
        }
    }

    pub fn matches(&self, element: &UIElement) -> bool {
        match self.attr {
            Field::Role => {
                let expected = Role::from_ax(&self.value);
                element.role_lossy().map(|r| r == expected).unwrap_or(false)
            }
            Field::Identifier => element.identifier().is_some_and(|t| self.test(&t)),
            Field::Title => element.title().is_some_and(|t| self.test(&t)),
            Field::Description => element.description().is_some_and(|t| self.test(&t)),
            Field::Value => element.value_text().is_some_and(|t| self.test(&t)),
            Field::Label => {
                element.title().is_some_and(|t| self.test(&t))
                    || element.description().is_some_and(|t| self.test(&t))
            }
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.conditions.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(" AND "))
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self.op {
            MatchOp::Equals => ":",
            MatchOp::Contains => "~:",
            MatchOp::Prefix => "^:",
        };
        let attr = match self.attr {
            Field::Role => "role",
            Field::Identifier => "id",
            Field::Title => "title",
            Field::Description => "desc",
            Field::Value => "value",
            Field::Label => "label",
        };
        write!(f, "{}{}{}", attr, op, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTree;

    #[test]
    fn parse_compound_with_all_ops() {
        let s = Selector::parse("role:CheckBox AND title~:contrast AND desc^:Incr").unwrap();
        assert_eq!(s.conditions.len(), 3);
        assert_eq!(s.conditions[1].op, MatchOp::Contains);
        assert_eq!(s.conditions[2].op, MatchOp::Prefix);
        assert_eq!(s.conditions[2].attr, Field::Description);
    }

    #[test]
    fn display_parses_back_to_same_selector() {
        let s = Selector::role(&Role::Button).and(Selector::description("Back"));
        assert_eq!(s.to_string(), "role:Button AND desc:Back");
        assert_eq!(Selector::parse(&s.to_string()).unwrap(), s);
    }

    #[test]
    fn rejects_unknown_attribute_and_empty_value() {
        assert!(Selector::parse("colour:red").is_err());
        assert!(Selector::parse("title:").is_err());
        assert!(Selector::parse("   ").is_err());
    }

    #[test]
    fn matches_live_element() {
        let tree = MockTree::new();
        let cb = tree
            .add(tree.root_id(), Role::CheckBox)
            .identifier("AX_INCREASE_CONTRAST")
            .title("Increase contrast")
            .id();
        let el = tree.element(cb);

        let both = Selector::parse("role:AXCheckBox AND id:AX_INCREASE_CONTRAST").unwrap();
        assert!(both.matches(&el));
        assert!(Selector::parse("label~:CONTRAST").unwrap().matches(&el));
        assert!(!Selector::parse("role:Slider").unwrap().matches(&el));
    }
}
