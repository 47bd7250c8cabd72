///! Per-provider label and score tables

use pguide_common::{AdvisoryCategory, Provider};

use AdvisoryCategory::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelRule {
    Canonical(AdvisoryCategory),
    /// Known provider category that has no place in the canonical schema
    Ignore,
}

/// How a provider expresses severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// `yes` / `no` flags
    Binary,
    /// Integer 0..=10
    ZeroToTen,
    /// Integer 0..=3
    ZeroToThree,
    /// Count of filled rating dots, 0..=5
    Dots,
    /// Letter grade A..=D with an optional `+` (one level up) or `-` (ignored)
    Letter,
    /// Severity words: None, Clean, Mild/Light, Moderate, Severe/Heavy
    Worded,
}

pub struct ProviderTable {
    pub provider: Provider,
    pub labels: &'static [(&'static str, LabelRule)],
    pub scale: Scale,
}

impl ProviderTable {
    pub fn rule_for(&self, label: &str) -> Option<LabelRule> {
        let label = label.trim();
        self.labels
            .iter()
            .find(|(raw, _)| raw.eq_ignore_ascii_case(label))
            .map(|(_, rule)| *rule)
    }
}

pub static IMDB: ProviderTable = ProviderTable {
    provider: Provider::Imdb,
    labels: &[
        ("Sex & Nudity", LabelRule::Canonical(SexNudity)),
        ("Violence & Gore", LabelRule::Canonical(Violence)),
        ("Profanity", LabelRule::Canonical(Profanity)),
        ("Alcohol, Drugs & Smoking", LabelRule::Canonical(SubstanceUse)),
        ("Frightening & Intense Scenes", LabelRule::Canonical(Frightening)),
    ],
    scale: Scale::Worded,
};

pub static KIDS_IN_MIND: ProviderTable = ProviderTable {
    provider: Provider::KidsInMind,
    labels: &[
        ("SEX/NUDITY", LabelRule::Canonical(SexNudity)),
        ("VIOLENCE/GORE", LabelRule::Canonical(Violence)),
        ("LANGUAGE", LabelRule::Canonical(Profanity)),
        ("SUBSTANCE USE", LabelRule::Canonical(SubstanceUse)),
        ("DISCUSSION TOPICS", LabelRule::Canonical(DiscussionTopics)),
        ("MESSAGE", LabelRule::Canonical(Message)),
    ],
    scale: Scale::ZeroToTen,
};

pub static DOVE: ProviderTable = ProviderTable {
    provider: Provider::DoveFoundation,
    labels: &[
        ("Sex", LabelRule::Canonical(SexNudity)),
        ("Nudity", LabelRule::Canonical(SexNudity)),
        ("Language", LabelRule::Canonical(Profanity)),
        ("Violence", LabelRule::Canonical(Violence)),
        ("Drugs", LabelRule::Canonical(SubstanceUse)),
        ("Other", LabelRule::Canonical(MiscellaneousImmorality)),
        ("Faith", LabelRule::Ignore),
        ("Integrity", LabelRule::Ignore),
    ],
    scale: Scale::ZeroToThree,
};

pub static PARENT_PREVIEWS: ProviderTable = ProviderTable {
    provider: Provider::ParentPreviews,
    labels: &[
        ("Sexual Content", LabelRule::Canonical(SexNudity)),
        ("Sexual Violence", LabelRule::Canonical(SexNudity)),
        ("Violence", LabelRule::Canonical(Violence)),
        ("Language", LabelRule::Canonical(Profanity)),
        ("Substance Use", LabelRule::Canonical(SubstanceUse)),
        ("Alcohol / Drug Use", LabelRule::Canonical(SubstanceUse)),
    ],
    scale: Scale::Letter,
};

pub static COMMON_SENSE: ProviderTable = ProviderTable {
    provider: Provider::CommonSenseMedia,
    labels: &[
        ("Positive Messages", LabelRule::Canonical(PositiveMessages)),
        ("Positive Role Models", LabelRule::Canonical(PositiveRoleModels)),
        ("Violence & Scariness", LabelRule::Canonical(Violence)),
        ("Sex, Romance & Nudity", LabelRule::Canonical(SexNudity)),
        ("Language", LabelRule::Canonical(Profanity)),
        ("Drinking, Drugs & Smoking", LabelRule::Canonical(SubstanceUse)),
        ("Diverse Representations", LabelRule::Ignore),
        ("Products & Purchases", LabelRule::Ignore),
        ("Educational Value", LabelRule::Ignore),
    ],
    scale: Scale::Dots,
};

pub static MOVIE_GUIDE: ProviderTable = ProviderTable {
    provider: Provider::MovieGuide,
    labels: &[
        (
            "Dominant Worldview and Other Worldview Content/Elements",
            LabelRule::Canonical(DominantWorldview),
        ),
        ("Foul Language", LabelRule::Canonical(Profanity)),
        ("Language", LabelRule::Canonical(Profanity)),
        ("Violence", LabelRule::Canonical(Violence)),
        ("Nudity", LabelRule::Canonical(SexNudity)),
        ("Sex", LabelRule::Canonical(SexNudity)),
        ("Making Love", LabelRule::Canonical(SexNudity)),
        ("Alcohol Use", LabelRule::Canonical(SubstanceUse)),
        ("Smoking and/or Drug Use and Abuse", LabelRule::Canonical(SubstanceUse)),
        ("Miscellaneous Immorality", LabelRule::Canonical(MiscellaneousImmorality)),
    ],
    scale: Scale::Worded,
};

pub static CRINGE_MDB: ProviderTable = ProviderTable {
    provider: Provider::CringeMdb,
    labels: &[
        ("Nudity", LabelRule::Canonical(SexNudity)),
        ("Sexual Violence", LabelRule::Canonical(SexNudity)),
        ("Sex Scene", LabelRule::Canonical(SexNudity)),
    ],
    scale: Scale::Binary,
};

pub fn table_for(provider: Provider) -> &'static ProviderTable {
    match provider {
        Provider::Imdb => &IMDB,
        Provider::KidsInMind => &KIDS_IN_MIND,
        Provider::DoveFoundation => &DOVE,
        Provider::ParentPreviews => &PARENT_PREVIEWS,
        Provider::CommonSenseMedia => &COMMON_SENSE,
        Provider::MovieGuide => &MOVIE_GUIDE,
        Provider::CringeMdb => &CRINGE_MDB,
    }
}
