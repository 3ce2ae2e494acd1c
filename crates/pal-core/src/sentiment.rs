//! Lexicon-based sentiment scoring for chat messages.
//!
//! The scorer walks the message once, averages the valence of every
//! lexicon word it finds, and flips the contribution of a word that
//! directly follows a negator ("not good"). The result is a polarity
//! in `[-1, 1]`, mapped onto a three-way label with fixed cutoffs.

use crate::Sentiment;

/// Polarity above this is classified positive.
pub const POSITIVE_THRESHOLD: f64 = 0.2;
/// Polarity below this is classified negative.
pub const NEGATIVE_THRESHOLD: f64 = -0.2;

/// (word, valence in [-1, 1])
const VALENCE_TABLE: &[(&str, f64)] = &[
    ("love", 0.6),
    ("loved", 0.6),
    ("like", 0.3),
    ("wonderful", 1.0),
    ("great", 0.8),
    ("good", 0.7),
    ("happy", 0.8),
    ("glad", 0.5),
    ("amazing", 0.7),
    ("awesome", 1.0),
    ("excellent", 1.0),
    ("fantastic", 0.5),
    ("perfect", 1.0),
    ("beautiful", 0.85),
    ("nice", 0.6),
    ("best", 1.0),
    ("better", 0.5),
    ("excited", 0.4),
    ("fun", 0.3),
    ("enjoy", 0.4),
    ("enjoyed", 0.4),
    ("thanks", 0.4),
    ("thank", 0.4),
    ("proud", 0.5),
    ("relaxed", 0.4),
    ("hate", -0.8),
    ("hated", -0.8),
    ("terrible", -1.0),
    ("awful", -1.0),
    ("horrible", -1.0),
    ("bad", -0.7),
    ("worst", -1.0),
    ("worse", -0.5),
    ("sad", -0.5),
    ("unhappy", -0.6),
    ("angry", -0.5),
    ("annoyed", -0.6),
    ("annoying", -0.6),
    ("frustrated", -0.6),
    ("frustrating", -0.6),
    ("upset", -0.6),
    ("tired", -0.4),
    ("exhausted", -0.7),
    ("worried", -0.3),
    ("anxious", -0.6),
    ("afraid", -0.6),
    ("stressed", -0.5),
    ("lonely", -0.5),
    ("miserable", -1.0),
    ("disappointed", -0.75),
    ("hurt", -0.6),
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "don't", "dont", "can't", "cant", "won't", "wont", "isn't", "isnt",
    "wasn't", "wasnt",
];

/// Negated words contribute at reduced, inverted weight.
const NEGATION_FACTOR: f64 = -0.5;

/// Classify the sentiment of free text.
///
/// Returns the label and the underlying polarity score. Text with no
/// lexicon hits scores 0.0 and classifies neutral.
pub fn classify(text: &str) -> (Sentiment, f64) {
    let polarity = polarity(text);
    let sentiment = if polarity > POSITIVE_THRESHOLD {
        Sentiment::Positive
    } else if polarity < NEGATIVE_THRESHOLD {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    };
    (sentiment, polarity)
}

/// The canned empathetic reply for a sentiment label.
pub fn reply(sentiment: Sentiment) -> &'static str {
    match sentiment {
        Sentiment::Positive => "That's wonderful to hear! Keep up the great vibes.",
        Sentiment::Negative => {
            "I'm sorry you're feeling that way. I'm here to listen. \
             Would you like to talk more about it?"
        }
        Sentiment::Neutral => "Thanks for sharing. I'm here to support you!",
    }
}

fn polarity(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|word| !word.is_empty())
        .collect();

    let mut sum = 0.0;
    let mut hits = 0usize;
    for (index, word) in words.iter().enumerate() {
        let Some(valence) = lookup(word) else { continue };
        let negated = index > 0 && NEGATORS.contains(&words[index - 1]);
        sum += if negated {
            valence * NEGATION_FACTOR
        } else {
            valence
        };
        hits += 1;
    }

    if hits == 0 {
        0.0
    } else {
        (sum / hits as f64).clamp(-1.0, 1.0)
    }
}

fn lookup(word: &str) -> Option<f64> {
    VALENCE_TABLE
        .iter()
        .find(|(entry, _)| *entry == word)
        .map(|(_, valence)| *valence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn love_scores_positive() {
        let (sentiment, polarity) = classify("I love this!");
        assert_eq!(sentiment, Sentiment::Positive);
        assert!(polarity > POSITIVE_THRESHOLD, "polarity was {polarity}");
    }

    #[test]
    fn complaints_score_negative() {
        let (sentiment, polarity) = classify("Today was terrible and I feel sad.");
        assert_eq!(sentiment, Sentiment::Negative);
        assert!(polarity < NEGATIVE_THRESHOLD, "polarity was {polarity}");
    }

    #[test]
    fn plain_statements_score_neutral() {
        let (sentiment, polarity) = classify("I have a meeting at three.");
        assert_eq!(sentiment, Sentiment::Neutral);
        assert_eq!(polarity, 0.0);
    }

    #[test]
    fn empty_text_scores_neutral() {
        let (sentiment, polarity) = classify("");
        assert_eq!(sentiment, Sentiment::Neutral);
        assert_eq!(polarity, 0.0);
    }

    #[test]
    fn negation_inverts_the_contribution() {
        let (plain_sentiment, plain) = classify("This is good.");
        let (negated_sentiment, negated) = classify("This is not good.");
        assert_eq!(plain_sentiment, Sentiment::Positive);
        assert!(negated < plain);
        assert_ne!(negated_sentiment, Sentiment::Positive);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let (sentiment, _) = classify("WHAT A WONDERFUL DAY");
        assert_eq!(sentiment, Sentiment::Positive);
    }

    #[test]
    fn polarity_stays_in_range() {
        let (_, polarity) =
            classify("wonderful awesome excellent perfect best wonderful awesome");
        assert!((-1.0..=1.0).contains(&polarity));
    }

    #[test]
    fn mixed_text_lands_near_the_middle() {
        let (_, polarity) = classify("The food was great but the service was terrible.");
        assert!(polarity.abs() <= POSITIVE_THRESHOLD, "polarity was {polarity}");
    }

    #[test]
    fn reply_table_is_fixed_per_label() {
        assert!(reply(Sentiment::Positive).contains("wonderful"));
        assert!(reply(Sentiment::Negative).contains("sorry"));
        assert!(reply(Sentiment::Neutral).contains("support"));
    }
}
