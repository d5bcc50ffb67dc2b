pub mod employee;
pub mod feedback;
pub mod issue;

/// Defines a fieldless enum persisted as a string column and generates:
/// - derives (Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)
/// - `as_str()` returning the stored representation
/// - `ALL` listing every variant
/// - `Display` and a lenient `FromStr` (case, spaces, `_` and `-` are ignored)
///
/// Usage:
///   string_enum!(Sentiment { Positive => "positive", Negative => "negative" });
#[macro_export]
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $repr:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Copy,
            Clone,
            PartialEq,
            Eq,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub enum $name {
            $(
                #[serde(rename = $repr)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $repr,)+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                let wanted = $crate::models::fold_enum_text(s);
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| $crate::models::fold_enum_text(v.as_str()) == wanted)
                    .ok_or_else(|| {
                        let allowed: Vec<&str> = $name::ALL.iter().map(|v| v.as_str()).collect();
                        format!(
                            "invalid {} '{}' (expected one of: {})",
                            stringify!($name),
                            s.trim(),
                            allowed.join(", ")
                        )
                    })
            }
        }
    };
}

/// Lowercases and drops separators so "Online Banking", "online_banking" and
/// "OnlineBanking" compare equal.
pub fn fold_enum_text(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}
