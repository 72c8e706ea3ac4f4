/// Maximum characters kept from a header-sourced value when a definition does
/// not name its own limit.
pub const DEFAULT_MAX_LENGTH: usize = 256;

/// A parsed `name` or `name:maxLength` input-variable definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputVarDefinition {
    pub name: String,
    pub max_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputVarError {
    EmptyName { definition: String },
    InvalidMaxLength { definition: String, value: String },
}

impl std::fmt::Display for InputVarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputVarError::EmptyName { definition } => {
                write!(f, "input variable definition '{definition}' has no name")
            }
            InputVarError::InvalidMaxLength { definition, value } => write!(
                f,
                "input variable definition '{definition}' has invalid max length '{value}'"
            ),
        }
    }
}

impl std::error::Error for InputVarError {}

impl InputVarDefinition {
    pub fn parse(definition: &str) -> Result<Self, InputVarError> {
        let mut parts = definition.split(':');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(InputVarError::EmptyName {
                definition: definition.to_string(),
            });
        }

        let max_length = match parts.next() {
            None => DEFAULT_MAX_LENGTH,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(value) if value > 0 => value,
                _ => {
                    return Err(InputVarError::InvalidMaxLength {
                        definition: definition.to_string(),
                        value: raw.to_string(),
                    });
                }
            },
        };

        Ok(Self {
            name: name.to_string(),
            max_length,
        })
    }

    /// Parses every definition, keeping declaration order.
    pub fn parse_all<S: AsRef<str>>(definitions: &[S]) -> Result<Vec<Self>, InputVarError> {
        definitions
            .iter()
            .map(|definition| Self::parse(definition.as_ref()))
            .collect()
    }

    /// Cuts `value` down to `max_length` characters.
    pub fn truncate(&self, value: &str) -> String {
        value.chars().take(self.max_length).collect()
    }
}
