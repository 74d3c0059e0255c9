//! Regex entity extractor
//!
//! Local fallback for the entity-extraction collaborator. Finds dates,
//! amounts, SIRET numbers (Luhn-checked) and IBANs (mod-97-checked), and
//! guesses the emitter from a table of well-known French issuers, company
//! legal forms, and finally the document's first uppercase header line.

use crate::text::normalize_for_match;
use crate::types::{
    Category, CollaboratorError, EmitterExtraction, EmitterInfo, Entity, EntityKind,
    EntityExtractor,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use std::collections::HashSet;

/// Well-known issuers: (display name, match key, is a bank)
const KNOWN_EMITTERS: &[(&str, &str, bool)] = &[
    ("EDF", "edf", false),
    ("Engie", "engie", false),
    ("TotalEnergies", "totalenergies", false),
    ("Orange", "orange", false),
    ("SFR", "sfr", false),
    ("Free", "free mobile", false),
    ("Bouygues Telecom", "bouygues telecom", false),
    ("SNCF", "sncf", false),
    ("RATP", "ratp", false),
    ("Navigo", "navigo", false),
    ("AXA", "axa", false),
    ("MAIF", "maif", false),
    ("MACIF", "macif", false),
    ("Allianz", "allianz", false),
    ("Groupama", "groupama", false),
    ("CPAM", "cpam", false),
    ("CAF", "caf", false),
    ("URSSAF", "urssaf", false),
    ("France Travail", "france travail", false),
    ("DGFiP", "dgfip", false),
    ("DGFiP", "finances publiques", false),
    ("BNP Paribas", "bnp paribas", true),
    ("Société Générale", "societe generale", true),
    ("Crédit Agricole", "credit agricole", true),
    ("Crédit Mutuel", "credit mutuel", true),
    ("LCL", "lcl", true),
    ("Caisse d'Epargne", "caisse d'epargne", true),
    ("Banque Populaire", "banque populaire", true),
    ("La Banque Postale", "banque postale", true),
    ("Boursorama", "boursorama", true),
];

const BANK_CATEGORIES: &[Category] = &[Category::Rib, Category::RelevesBancaires];

const DATE_NUMERIC: &str = r"\b(\d{1,2})[/.-](\d{1,2})[/.-](\d{4})\b";
const DATE_WRITTEN: &str = r"(?i)\b(\d{1,2})(?:er)?\s+(janvier|fevrier|février|mars|avril|mai|juin|juillet|aout|août|septembre|octobre|novembre|decembre|décembre)\s+(\d{4})\b";
const AMOUNT: &str = r"(?i)(\d{1,3}(?:[ \x{A0}.]\d{3})*,\d{2}|\d+(?:[.,]\d{2})?)\s?(?:€|eur\b|euros?\b)";
const SIRET: &str = r"\b(\d{3}\s?\d{3}\s?\d{3}\s?\d{5})\b";
const IBAN: &str = r"\b([A-Z]{2}\d{2}(?:\s?[A-Z0-9]{4}){2,7}(?:\s?[A-Z0-9]{1,3})?)\b";
const LEGAL_FORM: &str = r"(?m)^\s*([A-Z][A-Za-z0-9&'. -]{1,40}?)\s+(?:SA|SAS|SASU|SARL|EURL|SCI|SNC)\b";

/// Pattern-based extractor
pub struct RegexEntityExtractor {
    date_numeric: Regex,
    date_written: Regex,
    amount: Regex,
    siret: Regex,
    iban: Regex,
    legal_form: Regex,
    known: Vec<(Regex, &'static str, bool)>,
}

fn compile(pattern: &str) -> Result<Regex, CollaboratorError> {
    Regex::new(pattern).map_err(|e| CollaboratorError::Parse(format!("Invalid pattern: {}", e)))
}

impl RegexEntityExtractor {
    pub fn new() -> Result<Self, CollaboratorError> {
        let known = KNOWN_EMITTERS
            .iter()
            .map(|(name, key, bank)| {
                compile(&format!(r"\b{}\b", regex::escape(key))).map(|re| (re, *name, *bank))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            date_numeric: compile(DATE_NUMERIC)?,
            date_written: compile(DATE_WRITTEN)?,
            amount: compile(AMOUNT)?,
            siret: compile(SIRET)?,
            iban: compile(IBAN)?,
            legal_form: compile(LEGAL_FORM)?,
            known,
        })
    }

    /// Typed entities found in `text`
    pub fn entities(&self, text: &str) -> Vec<Entity> {
        let mut entities = Vec::new();

        for caps in self.date_numeric.captures_iter(text) {
            let valid = parse_date(&caps[1], &caps[2], &caps[3]).is_some();
            entities.push(Entity::new(EntityKind::Date, &caps[0], 0.8).with_validity(valid));
        }
        for caps in self.date_written.captures_iter(text) {
            let month = month_number(&normalize_for_match(&caps[2]));
            let valid = month
                .and_then(|m| parse_date(&caps[1], &m.to_string(), &caps[3]))
                .is_some();
            entities.push(Entity::new(EntityKind::Date, &caps[0], 0.8).with_validity(valid));
        }
        for caps in self.amount.captures_iter(text) {
            entities.push(Entity::new(EntityKind::Amount, caps[0].trim(), 0.8));
        }
        for caps in self.siret.captures_iter(text) {
            let digits: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
            let valid = luhn_valid(&digits);
            entities.push(
                Entity::new(EntityKind::Siret, digits, if valid { 0.95 } else { 0.4 })
                    .with_validity(valid),
            );
        }
        for caps in self.iban.captures_iter(text) {
            let compact: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
            let valid = iban_valid(&compact);
            entities.push(
                Entity::new(EntityKind::Iban, compact, if valid { 0.95 } else { 0.4 })
                    .with_validity(valid),
            );
        }

        entities
    }

    /// Emitter candidates, best first
    pub fn emitters(&self, text: &str, category_hint: Option<&Category>) -> Vec<EmitterInfo> {
        let normalized = normalize_for_match(text);
        let prefer_banks = category_hint
            .map(|c| BANK_CATEGORIES.contains(c))
            .unwrap_or(false);

        // Known issuers ordered by (bank preference, first position)
        let mut known: Vec<(bool, usize, &str)> = self
            .known
            .iter()
            .filter_map(|(re, name, bank)| {
                re.find(&normalized)
                    .map(|m| (prefer_banks && !*bank, m.start(), *name))
            })
            .collect();
        known.sort();

        let mut candidates: Vec<EmitterInfo> = known
            .into_iter()
            .map(|(_, _, name)| EmitterInfo::new(name, 0.9))
            .collect();

        candidates.extend(
            self.legal_form
                .captures_iter(text)
                .map(|caps| EmitterInfo::new(caps[1].trim(), 0.7)),
        );

        if let Some(header) = header_line(text) {
            candidates.push(EmitterInfo::new(header, 0.5));
        }

        let mut seen = HashSet::new();
        candidates.retain(|e| seen.insert(e.normalized_name.to_lowercase()));
        candidates
    }
}

/// First short uppercase line that looks like a letterhead
fn header_line(text: &str) -> Option<&str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(5)
        .find(|l| {
            let letters = l.chars().filter(|c| c.is_alphabetic()).count();
            letters >= 3
                && l.chars().count() <= 40
                && l.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase())
        })
}

fn parse_date(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn month_number(name: &str) -> Option<u32> {
    let n = match name {
        "janvier" => 1,
        "fevrier" => 2,
        "mars" => 3,
        "avril" => 4,
        "mai" => 5,
        "juin" => 6,
        "juillet" => 7,
        "aout" => 8,
        "septembre" => 9,
        "octobre" => 10,
        "novembre" => 11,
        "decembre" => 12,
        _ => return None,
    };
    Some(n)
}

/// Luhn checksum over a string of ASCII digits
pub fn luhn_valid(digits: &str) -> bool {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let sum: u32 = digits
        .chars()
        .rev()
        .enumerate()
        .map(|(i, c)| {
            let d = c.to_digit(10).unwrap_or(0);
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// ISO 13616 mod-97 check on a compact IBAN
pub fn iban_valid(iban: &str) -> bool {
    if iban.len() < 15 || iban.len() > 34 || !iban.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    let rearranged = iban[4..].chars().chain(iban[..4].chars());
    let mut remainder: u32 = 0;
    for c in rearranged {
        let value = match c.to_digit(36) {
            Some(v) => v,
            None => return false,
        };
        remainder = if value >= 10 {
            (remainder * 100 + value) % 97
        } else {
            (remainder * 10 + value) % 97
        };
    }
    remainder == 1
}

#[async_trait]
impl EntityExtractor for RegexEntityExtractor {
    fn name(&self) -> &'static str {
        "regex"
    }

    async fn extract_emitter(
        &self,
        text: &str,
        category_hint: Option<&Category>,
    ) -> Result<EmitterExtraction, CollaboratorError> {
        let all_emitters = self.emitters(text, category_hint);
        let mut entities = self.entities(text);
        entities.extend(
            all_emitters
                .iter()
                .map(|e| Entity::new(EntityKind::Emitter, &e.original_name, e.confidence)),
        );

        Ok(EmitterExtraction {
            primary_emitter: all_emitters.first().cloned(),
            all_emitters,
            entities,
        })
    }
}
