//! Keyword classifiers and dashboard aggregation helpers

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};

use crate::db::{DailyActivity, ResponseTimeSample};
use crate::models::Sentiment;

const POSITIVE_WORDS: &[&str] = &[
    "thank", "thanks", "great", "awesome", "excellent", "love", "perfect", "happy", "amazing",
    "helpful", "appreciate", "good", "wonderful", "fantastic", "resolved",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "hate", "angry", "disappointed", "problem", "issue", "broken",
    "worst", "refund", "complaint", "frustrated", "useless", "not working", "slow",
];

/// Customer issue category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Topic {
    Billing,
    Technical,
    Shipping,
    Account,
    Product,
    Other,
}

impl Topic {
    fn keywords(self) -> &'static [&'static str] {
        match self {
            Topic::Billing => &["bill", "invoice", "payment", "charge", "refund", "price", "subscription", "card"],
            Topic::Technical => &["error", "bug", "crash", "not working", "broken", "login", "password", "slow", "loading"],
            Topic::Shipping => &["ship", "delivery", "deliver", "tracking", "package", "arrive", "courier"],
            Topic::Account => &["account", "profile", "sign up", "signup", "username", "email address", "settings"],
            Topic::Product => &["product", "feature", "size", "color", "stock", "quality", "item"],
            Topic::Other => &[],
        }
    }
}

fn hits(text: &str, words: &[&str]) -> usize {
    words.iter().filter(|w| text.contains(*w)).count()
}

/// Side with more keyword hits wins; ties are neutral
pub fn classify_sentiment(text: &str) -> Sentiment {
    let lower = text.to_lowercase();
    let positive = hits(&lower, POSITIVE_WORDS);
    let negative = hits(&lower, NEGATIVE_WORDS);

    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

/// Category with the most keyword hits, first declared wins a tie
pub fn classify_topic(text: &str) -> Topic {
    let lower = text.to_lowercase();
    let mut best = (Topic::Other, 0);
    for topic in Topic::iter() {
        let score = hits(&lower, topic.keywords());
        if score > best.1 {
            best = (topic, score);
        }
    }
    best.0
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopicCount {
    pub topic: Topic,
    pub count: i64,
}

/// Count every topic, including zero counts, in declaration order
pub fn topic_breakdown<S: AsRef<str>>(texts: &[S]) -> Vec<TopicCount> {
    let mut counts: Vec<TopicCount> = Topic::iter().map(|topic| TopicCount { topic, count: 0 }).collect();
    for text in texts {
        let topic = classify_topic(text.as_ref());
        if let Some(entry) = counts.iter_mut().find(|c| c.topic == topic) {
            entry.count += 1;
        }
    }
    counts
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct SentimentBreakdown {
    pub positive: i64,
    pub neutral: i64,
    pub negative: i64,
}

impl SentimentBreakdown {
    pub fn from_counts(counts: &[(String, i64)]) -> Self {
        let mut breakdown = Self::default();
        for (label, count) in counts {
            match label.parse::<Sentiment>() {
                Ok(Sentiment::Positive) => breakdown.positive += count,
                Ok(Sentiment::Negative) => breakdown.negative += count,
                _ => breakdown.neutral += count,
            }
        }
        breakdown
    }

    pub fn total(&self) -> i64 {
        self.positive + self.neutral + self.negative
    }
}

/// One entry per day from `today - days + 1` through `today`, missing days as zero
pub fn zero_fill_activity(sparse: &[DailyActivity], days: i64, today: NaiveDate) -> Vec<DailyActivity> {
    (0..days)
        .rev()
        .map(|offset| {
            let date = (today - Duration::days(offset)).format("%Y-%m-%d").to_string();
            let count = sparse.iter().find(|d| d.date == date).map_or(0, |d| d.count);
            DailyActivity { date, count }
        })
        .collect()
}

/// Mean minutes between first client message and first reply; None when nothing was answered
pub fn average_response_minutes(samples: &[ResponseTimeSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let total_seconds: i64 = samples
        .iter()
        .map(|s| (s.first_reply_at - s.first_client_at).num_seconds().max(0))
        .sum();
    let minutes = total_seconds as f64 / 60.0 / samples.len() as f64;
    Some((minutes * 10.0).round() / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_sentiment() {
        assert_eq!(classify_sentiment("Thanks, this is GREAT!"), Sentiment::Positive);
        assert_eq!(classify_sentiment("The app is broken and I am frustrated"), Sentiment::Negative);
        assert_eq!(classify_sentiment("What time do you open?"), Sentiment::Neutral);
        // one hit each side
        assert_eq!(classify_sentiment("great but broken"), Sentiment::Neutral);
    }

    #[test]
    fn test_topics() {
        assert_eq!(classify_topic("I was charged twice on my invoice"), Topic::Billing);
        assert_eq!(classify_topic("Where is my package? tracking says nothing"), Topic::Shipping);
        assert_eq!(classify_topic("The app shows an error when I log in"), Topic::Technical);
        assert_eq!(classify_topic("hello there"), Topic::Other);
    }

    #[test]
    fn test_topic_breakdown_includes_zeroes() {
        let breakdown = topic_breakdown(&["refund please", "payment failed", "hi"]);
        assert_eq!(breakdown.len(), 6);
        assert_eq!(breakdown[0], TopicCount { topic: Topic::Billing, count: 2 });
        assert_eq!(breakdown.iter().find(|c| c.topic == Topic::Other).unwrap().count, 1);
        assert_eq!(breakdown.iter().find(|c| c.topic == Topic::Shipping).unwrap().count, 0);
    }

    #[test]
    fn test_sentiment_breakdown() {
        let counts = vec![("positive".to_string(), 3), ("negative".to_string(), 1), ("neutral".to_string(), 2)];
        let breakdown = SentimentBreakdown::from_counts(&counts);
        assert_eq!(breakdown, SentimentBreakdown { positive: 3, neutral: 2, negative: 1 });
        assert_eq!(breakdown.total(), 6);
    }

    #[test]
    fn test_zero_fill() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let sparse = vec![DailyActivity { date: "2024-03-09".into(), count: 4 }];
        let filled = zero_fill_activity(&sparse, 3, today);
        assert_eq!(
            filled,
            vec![
                DailyActivity { date: "2024-03-08".into(), count: 0 },
                DailyActivity { date: "2024-03-09".into(), count: 4 },
                DailyActivity { date: "2024-03-10".into(), count: 0 },
            ]
        );
    }

    #[test]
    fn test_average_response_minutes() {
        assert_eq!(average_response_minutes(&[]), None);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let samples = vec![
            ResponseTimeSample { conversation_id: 1, first_client_at: start, first_reply_at: start + Duration::minutes(10) },
            ResponseTimeSample { conversation_id: 2, first_client_at: start, first_reply_at: start + Duration::minutes(5) },
        ];
        assert_eq!(average_response_minutes(&samples), Some(7.5));
    }
}
