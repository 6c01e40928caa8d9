use crate::error::CrmError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Enumerated field values with fixed integer codes. Each enum serializes
/// as its code and parses from its label.
macro_rules! choice_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident = $code:literal => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "i64", into = "i64")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn code(self) -> i64 {
                match self {
                    $($name::$variant => $code),+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl TryFrom<i64> for $name {
            type Error = CrmError;

            fn try_from(code: i64) -> Result<Self, Self::Error> {
                match code {
                    $($code => Ok($name::$variant),)+
                    _ => Err(CrmError::Validation(format!(
                        "{code} is not a valid {} code",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> i64 {
                value.code()
            }
        }

        impl FromStr for $name {
            type Err = CrmError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|c| c.label() == s)
                    .ok_or_else(|| {
                        CrmError::Validation(format!("'{s}' is not a valid {}", stringify!($name)))
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

choice_enum! {
    /// How a customer found the institute.
    CustomerSource {
        Referral = 0 => "referral",
        OfficialSite = 1 => "official site",
        SearchAd = 2 => "search engine ad",
        QaPlatform = 3 => "Q&A platform",
        Marketing = 4 => "marketing outreach",
        CommunityGroup = 5 => "community group",
    }
}

choice_enum! {
    /// Enrollment intention recorded on a follow-up.
    Intention {
        WithinTwoWeeks = 0 => "within two weeks",
        WithinOneMonth = 1 => "within one month",
        NoNearTermPlan = 2 => "no near-term plan",
        WillNotEnroll = 3 => "will not enroll",
        AlreadyEnrolled = 4 => "already enrolled",
        Undecided = 5 => "undecided",
    }
}

choice_enum! {
    ClassType {
        FullTime = 0 => "in-person full-time",
        Weekend = 1 => "in-person weekend",
        Online = 2 => "online",
    }
}

choice_enum! {
    Attendance {
        Present = 0 => "present",
        Late = 1 => "late",
        Absent = 2 => "absent",
        LeftEarly = 3 => "left early",
    }
}

choice_enum! {
    /// Grade bucket of a study record. `Copied` marks plagiarized work.
    Score {
        APlus = 100 => "A+",
        A = 90 => "A",
        BPlus = 85 => "B+",
        B = 80 => "B",
        BMinus = 75 => "B-",
        CPlus = 65 => "C+",
        C = 60 => "C",
        CMinus = 40 => "C-",
        D = -50 => "D",
        Copied = -100 => "COPY",
        NotApplicable = 0 => "N/A",
    }
}

impl Default for Attendance {
    fn default() -> Self {
        Attendance::Present
    }
}
