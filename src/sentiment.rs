use serde::{Deserialize, Serialize};

/// Coarse sentiment bucket derived from an emotion label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Unknown,
}

/// Label fragments per bucket, checked in order; first match wins
const RULES: &[(Sentiment, &[&str])] = &[
    (Sentiment::Positive, &["_happy", "_surprise"]),
    (Sentiment::Negative, &["_sad", "_angry", "_fear", "_disgust"]),
    (Sentiment::Neutral, &["_neutral"]),
];

impl Sentiment {
    /// Map an emotion label such as "04_happy" to its sentiment bucket
    pub fn from_label(label: &str) -> Self {
        RULES
            .iter()
            .find(|(_, fragments)| fragments.iter().any(|f| label.contains(f)))
            .map_or(Sentiment::Unknown, |(sentiment, _)| *sentiment)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-function form of [`Sentiment::from_label`]
pub fn map_sentiment(label: &str) -> Sentiment {
    Sentiment::from_label(label)
}
