//! Scope classification over an ordered rule table.
//!
//! Rules are grouped by [`RuleCategory`] and evaluated in [`PRIORITY`] order;
//! the first category with a matching rule decides the [`Intent`]. Domain terms
//! come first, so a question that mentions a product is in scope even when it
//! also mentions an off-topic word.

use rand::seq::SliceRandom;
use regex::{Regex, RegexBuilder};

use kbchat_core::error::{Error, Result};
use kbchat_core::types::{Intent, IntentLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    Domain,
    OffTopic,
    Injection,
}

pub const PRIORITY: [RuleCategory; 3] = [RuleCategory::Domain, RuleCategory::OffTopic, RuleCategory::Injection];

impl RuleCategory {
    fn label(self) -> IntentLabel {
        match self {
            Self::Domain => IntentLabel::In,
            Self::OffTopic | Self::Injection => IntentLabel::Out,
        }
    }

    fn confidence(self) -> f32 {
        match self {
            Self::Domain | Self::OffTopic => 0.9,
            Self::Injection => 0.95,
        }
    }

    fn reason(self) -> &'static str {
        match self {
            Self::Domain => "Contains Discovery-related terms",
            Self::OffTopic => "Contains out-of-scope topic",
            Self::Injection => "Potential jailbreak attempt",
        }
    }
}

const DEFAULT_REASON: &str = "No clear Discovery or out-of-scope indicators";

/// Uncompiled form of a rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    pub category: RuleCategory,
    pub pattern: &'static str,
    /// The rule does not fire on a match immediately followed by this.
    pub not_followed_by: Option<&'static str>,
}

const fn rule(category: RuleCategory, pattern: &'static str) -> RuleSpec {
    RuleSpec { category, pattern, not_followed_by: None }
}

const fn guarded(category: RuleCategory, pattern: &'static str, not_followed_by: &'static str) -> RuleSpec {
    RuleSpec { category, pattern, not_followed_by: Some(not_followed_by) }
}

const PRODUCT_NOUN: &str = r"\s+(benefit|plan|cover)";

use RuleCategory::{Domain, Injection, OffTopic};

pub const DEFAULT_RULES: &[RuleSpec] = &[
    rule(Domain, r"\bdiscovery\b"),
    rule(Domain, r"\bvitality\b"),
    rule(Domain, r"\bkeycare\b"),
    rule(Domain, r"\bplan\b"),
    rule(Domain, r"\bclaim\b"),
    rule(Domain, r"\bbenefit\b"),
    rule(Domain, r"\bmiles\b"),
    rule(Domain, r"\bintegrator\b"),
    rule(Domain, r"\bbank\b"),
    rule(Domain, r"\blife\b"),
    rule(Domain, r"\binsure\b"),
    rule(Domain, r"\bmedical\s+scheme\b"),
    rule(Domain, r"\bhealth\s+cover\b"),
    rule(Domain, r"\bgp\b|\bdoctor\b"),
    rule(Domain, r"\bconsultation\b"),
    rule(Domain, r"\bpremium\b"),
    rule(Domain, r"\bcontribution\b"),
    rule(Domain, r"\bwaiting\s+period\b"),
    rule(Domain, r"\blate\s+joiner\b"),
    rule(Domain, r"\bpersonal\s+health\s+pathways\b"),
    rule(Domain, r"\bhealthyfood\b"),
    rule(Domain, r"\bhealthycare\b"),
    rule(Domain, r"\bhealthybaby\b"),
    rule(Domain, r"\bactive\s+gear\b"),
    rule(Domain, r"\bvirgin\s+active\b"),
    rule(Domain, r"\bplanet\s+fitness\b"),
    rule(Domain, r"\bster\s+kinekor\b"),
    rule(Domain, r"\bclicks\b"),
    rule(Domain, r"\bdis\s+chem\b"),
    rule(Domain, r"\bwoolworths\b"),
    rule(Domain, r"\bcheckers\b"),
    rule(
        OffTopic,
        r"\bworld cup\b|\bscore\b|\bfixture\b|\briddle\b|\bprime\b|\b2\+2\b|\bbitcoin\b|\betf\b|\bcapitec\b|\bozempic\b|\bdose\b|\blawsuit\b|\bpolitics\b|\bheadline\b",
    ),
    rule(OffTopic, r"\bweather\b|\btemperature\b|\bforecast\b"),
    rule(OffTopic, r"\brecipe\b|\bcooking\b"),
    guarded(OffTopic, r"\bfood\b", PRODUCT_NOUN),
    guarded(OffTopic, r"\btravel\b", PRODUCT_NOUN),
    guarded(OffTopic, r"\bsports\b", PRODUCT_NOUN),
    rule(OffTopic, r"\bentertainment\b|\bmovie\b|\bshow\b"),
    rule(OffTopic, r"\bnews\b|\bcurrent\s+events\b"),
    rule(OffTopic, r"\bmath\b|\bcalculation\b|\bcalculator\b"),
    rule(OffTopic, r"\bcode\b|\bprogramming\b|\bsoftware\b"),
    rule(Injection, r"\bignore\s+(instructions|rules)\b"),
    rule(Injection, r"\bpretend\s+to\s+be\b"),
    rule(Injection, r"\bact\s+as\b"),
    rule(Injection, r"\bbypass\b"),
    rule(Injection, r"\boverride\b"),
    rule(Injection, r"\bdisregard\b"),
    rule(Injection, r"\bforget\b"),
];

pub const UNSAFE_PATTERNS: &[&str] = &[
    r"\bkill\b|\bmurder\b|\bharm\b|\bviolence\b",
    r"\bhack\b|\bexploit\b|\bbreach\b",
    r"\bpersonal\s+information\b|\bprivate\s+data\b",
    r"\bcredit\s+card\b|\bpassword\b|\bpin\b",
];

pub const CLARIFIERS: [&str; 3] = [
    "Which Discovery product or service are you asking about? (e.g., Vitality, KeyCare, medical scheme)",
    "Could you please specify which Discovery benefit or plan you're interested in?",
    "Are you asking about Discovery Health, Discovery Life, or another Discovery product?",
];

#[derive(Debug, Clone)]
struct Rule {
    category: RuleCategory,
    pattern: Regex,
    not_followed_by: Option<Regex>,
}

impl Rule {
    fn matches(&self, text: &str) -> bool {
        match &self.not_followed_by {
            None => self.pattern.is_match(text),
            Some(guard) => self.pattern.find_iter(text).any(|m| !guard.is_match(&text[m.end()..])),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::InvalidConfig(format!("guard pattern `{pattern}`: {e}")))
}

#[derive(Debug, Clone)]
pub struct IntentGuard {
    rules: Vec<Rule>,
    unsafe_patterns: Vec<Regex>,
}

impl IntentGuard {
    pub fn standard() -> Result<Self> { Self::from_rules(DEFAULT_RULES, UNSAFE_PATTERNS) }

    pub fn from_rules(rules: &[RuleSpec], unsafe_patterns: &[&str]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|spec| {
                Ok(Rule {
                    category: spec.category,
                    pattern: compile(spec.pattern)?,
                    // Anchored so it only inspects the text right after a match.
                    not_followed_by: spec.not_followed_by.map(|p| compile(&format!("^(?:{p})"))).transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let unsafe_patterns = unsafe_patterns.iter().map(|p| compile(p)).collect::<Result<Vec<_>>>()?;
        Ok(Self { rules, unsafe_patterns })
    }

    pub fn classify(&self, text: &str) -> Intent {
        for category in PRIORITY {
            if self.rules.iter().filter(|r| r.category == category).any(|r| r.matches(text)) {
                return Intent {
                    label: category.label(),
                    confidence: category.confidence(),
                    reason: category.reason().to_string(),
                };
            }
        }
        Intent { label: IntentLabel::Ambiguous, confidence: 0.5, reason: DEFAULT_REASON.to_string() }
    }

    /// Violence, hacking, and credential or personal-data solicitation.
    pub fn is_unsafe(&self, text: &str) -> bool { self.unsafe_patterns.iter().any(|p| p.is_match(text)) }

    pub fn clarifier(&self) -> &'static str {
        CLARIFIERS.choose(&mut rand::thread_rng()).copied().unwrap_or(CLARIFIERS[0])
    }
}
