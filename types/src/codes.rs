//! Closed enums persisted by string code.
//!
//! `code_enum!` generates the enum, a single variant ↔ code table, and serde
//! impls that go through the code, so an unknown code fails at decode time
//! with [`TypesError::UnknownCode`](crate::TypesError::UnknownCode).

macro_rules! code_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $code:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(into = "String", try_from = "String")]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant
            ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The persisted code for this variant.
            pub fn code(&self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }

            /// Decode a persisted code.
            pub fn from_code(code: &str) -> Result<Self, crate::TypesError> {
                match code {
                    $($code => Ok($name::$variant),)+
                    other => Err(crate::TypesError::UnknownCode {
                        kind: stringify!($name),
                        code: other.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.code())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::TypesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_code(s)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.code().to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = crate::TypesError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::from_code(&value)
            }
        }
    };
}
