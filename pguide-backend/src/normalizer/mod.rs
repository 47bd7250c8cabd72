///! Maps provider labels and scores onto the canonical categories and severity scale

pub mod tables;

use pguide_common::{AdvisoryCategory, AdvisoryItem, Provider, ReviewRecord, ReviewStatus, Severity};

use crate::error::NormalizationError;
use crate::providers::{RawAdvisoryItem, RawProviderRecord};
pub use tables::{table_for, LabelRule, ProviderTable, Scale};

/// Four-step ladder used by letter grades and 0..=3 scales.
const LADDER: [Severity; 4] = [Severity::None, Severity::Mild, Severity::Moderate, Severity::Severe];

/// Maps a provider label to its canonical category.
pub fn map_label(provider: Provider, label: &str) -> Result<AdvisoryCategory, NormalizationError> {
    match table_for(provider).rule_for(label) {
        Some(LabelRule::Canonical(category)) => Ok(category),
        Some(LabelRule::Ignore) => Err(NormalizationError::Excluded {
            provider,
            label: label.trim().to_string(),
        }),
        None => Err(NormalizationError::UnknownLabel {
            provider,
            label: label.trim().to_string(),
        }),
    }
}

/// Maps a provider score onto the canonical severity scale.
pub fn map_score(provider: Provider, label: &str, score: &str) -> Result<Severity, NormalizationError> {
    let scale = table_for(provider).scale;
    scale_severity(scale, score.trim()).ok_or_else(|| NormalizationError::UnknownScore {
        provider,
        label: label.trim().to_string(),
        score: score.trim().to_string(),
    })
}

fn scale_severity(scale: Scale, score: &str) -> Option<Severity> {
    match scale {
        Scale::Binary => match score.to_ascii_lowercase().as_str() {
            "yes" => Some(Severity::Moderate),
            "no" => Some(Severity::None),
            _ => None,
        },
        Scale::ZeroToTen => match score.parse::<u8>().ok()? {
            0 => Some(Severity::None),
            1 => Some(Severity::Clean),
            2..=4 => Some(Severity::Mild),
            5..=7 => Some(Severity::Moderate),
            8..=10 => Some(Severity::Severe),
            _ => None,
        },
        Scale::ZeroToThree => LADDER.get(score.parse::<usize>().ok()?).copied(),
        Scale::Dots => match score.parse::<u8>().ok()? {
            0 => Some(Severity::Clean),
            1 => Some(Severity::Mild),
            2 | 3 => Some(Severity::Moderate),
            4 | 5 => Some(Severity::Severe),
            _ => None,
        },
        Scale::Letter => letter_severity(score),
        Scale::Worded => match score.to_ascii_lowercase().as_str() {
            "none" => Some(Severity::None),
            "clean" => Some(Severity::Clean),
            "mild" | "light" => Some(Severity::Mild),
            "moderate" => Some(Severity::Moderate),
            "severe" | "heavy" => Some(Severity::Severe),
            _ => None,
        },
    }
}

fn letter_severity(score: &str) -> Option<Severity> {
    let grade = score.replace('-', "");
    let grade = grade.trim();
    let (letter, bump) = match grade.strip_suffix('+') {
        Some(letter) => (letter.trim(), 1),
        None => (grade, 0),
    };

    let index = match letter.to_ascii_uppercase().as_str() {
        "A" => 0,
        "B" => 1,
        "C" => 2,
        "D" => 3,
        _ => return None,
    };
    Some(LADDER[(index + bump).min(LADDER.len() - 1)])
}

/// Normalizes one raw item, carrying description and votes through.
pub fn normalize(provider: Provider, raw: &RawAdvisoryItem) -> Result<AdvisoryItem, NormalizationError> {
    let name = map_label(provider, &raw.label)?;
    let severity = map_score(provider, &raw.label, &raw.score)?;
    Ok(AdvisoryItem {
        name,
        severity,
        description: raw.description.trim().to_string(),
        votes: raw.votes.clone(),
    })
}

/// Builds the canonical record. Items that fail to normalize are dropped and
/// logged. A record left with no items is marked failed.
pub fn normalize_record(raw: RawProviderRecord) -> ReviewRecord {
    let provider = raw.provider;
    let mut items = Vec::with_capacity(raw.items.len());

    for item in &raw.items {
        match normalize(provider, item) {
            Ok(normalized) => items.push(normalized),
            Err(e @ NormalizationError::Excluded { .. }) => tracing::debug!("{}", e),
            Err(e) => tracing::error!("Dropping advisory item: {}", e),
        }
    }

    let (status, review_items) = if items.is_empty() {
        tracing::warn!("{} returned no usable advisory items for '{}'", provider, raw.title);
        (ReviewStatus::Failed, None)
    } else {
        (ReviewStatus::Success, Some(items))
    };

    ReviewRecord {
        id: raw.id,
        status,
        title: raw.title,
        provider,
        recommended_age: raw.recommended_age,
        review_items,
        review_link: raw.review_link,
        is_episode: raw.is_episode,
        series_id: raw.series_id,
        is_cached: None,
    }
}
