//! Rule tables for the rule-based classifier
//!
//! Rules are data: each category carries a pattern set, and new categories or
//! cues are added by extending the table (or loading one from JSON) rather
//! than by adding code branches. All strings are written in the folded,
//! lowercase form produced by [`crate::text::normalize_for_match`].

use crate::types::Category;
use serde::{Deserialize, Serialize};

/// Kind of rule that fired, ordered from least to most specific
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Keyword,
    /// Filename prefix or suffix
    Affix,
    Pattern,
    /// Known named entity (bank, utility, administration)
    Entity,
}

impl MatchKind {
    /// Specificity multiplier applied on top of the category base weight
    pub fn multiplier(&self) -> f64 {
        match self {
            MatchKind::Keyword => 1.0,
            MatchKind::Affix => 2.0,
            MatchKind::Pattern => 2.5,
            MatchKind::Entity => 4.0,
        }
    }
}

/// Pattern set of one category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRules {
    pub category: Category,
    #[serde(default = "default_base_weight")]
    pub base_weight: f64,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Regular expressions matched against folded filename + text
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Filename stem prefixes
    #[serde(default)]
    pub prefixes: Vec<String>,
    /// Filename stem suffixes
    #[serde(default)]
    pub suffixes: Vec<String>,
    /// Known named entities
    #[serde(default)]
    pub entities: Vec<String>,
}

fn default_base_weight() -> f64 {
    1.0
}

impl CategoryRules {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            base_weight: default_base_weight(),
            keywords: Vec::new(),
            patterns: Vec::new(),
            prefixes: Vec::new(),
            suffixes: Vec::new(),
            entities: Vec::new(),
        }
    }

    fn weight(mut self, w: f64) -> Self {
        self.base_weight = w;
        self
    }

    fn keywords(mut self, items: &[&str]) -> Self {
        self.keywords = to_strings(items);
        self
    }

    fn patterns(mut self, items: &[&str]) -> Self {
        self.patterns = to_strings(items);
        self
    }

    fn prefixes(mut self, items: &[&str]) -> Self {
        self.prefixes = to_strings(items);
        self
    }

    fn suffixes(mut self, items: &[&str]) -> Self {
        self.suffixes = to_strings(items);
        self
    }

    fn entities(mut self, items: &[&str]) -> Self {
        self.entities = to_strings(items);
        self
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Ordered rule table; order is the final tie-break
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub categories: Vec<CategoryRules>,
}

impl RuleSet {
    /// Parse a rule table from JSON (`{"categories": [...]}`)
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Category labels present in the table
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter().map(|r| &r.category)
    }
}

const BANKS: &[&str] = &[
    "credit agricole",
    "bnp paribas",
    "societe generale",
    "caisse d'epargne",
    "banque populaire",
    "credit mutuel",
    "la banque postale",
    "boursorama",
    "lcl",
];

impl Default for RuleSet {
    /// Built-in French administrative document rules
    fn default() -> Self {
        let categories = vec![
            CategoryRules::new(Category::Factures)
                .keywords(&[
                    "facture",
                    "montant",
                    "ttc",
                    "tva",
                    "total a payer",
                    "net a payer",
                    "echeance",
                    "consommation",
                    "reglement",
                ])
                .patterns(&[
                    r"facture\s*(n|no|num|numero)\s*[:°.]?\s*\w+",
                    r"total\s+ttc",
                    r"\d+[.,]\d{2}\s*(€|eur)",
                ])
                .prefixes(&["facture", "fact_", "invoice"])
                .suffixes(&["_facture", "_fact", "_invoice"])
                .entities(&[
                    "edf",
                    "engie",
                    "orange",
                    "free",
                    "sfr",
                    "bouygues telecom",
                    "veolia",
                    "totalenergies",
                ]),
            CategoryRules::new(Category::Rib)
                .keywords(&[
                    "rib",
                    "iban",
                    "bic",
                    "releve d'identite bancaire",
                    "titulaire du compte",
                    "code banque",
                    "code guichet",
                    "domiciliation",
                ])
                .patterns(&[
                    r"\bfr\d{2}(\s?\d{4}){2}",
                    r"\biban\s*:?\s*[a-z]{2}\d{2}",
                    r"\bbic\s*:?\s*[a-z]{6}[a-z0-9]{2}",
                ])
                .prefixes(&["rib"])
                .suffixes(&["_rib"])
                .entities(BANKS),
            CategoryRules::new(Category::RelevesBancaires)
                .keywords(&[
                    "releve de compte",
                    "solde",
                    "ancien solde",
                    "nouveau solde",
                    "date de valeur",
                    "virement",
                    "prelevement",
                ])
                .patterns(&[
                    r"releve\s+(de\s+)?compte",
                    r"solde\s+(crediteur|debiteur)",
                    r"du\s+\d{2}/\d{2}/\d{4}\s+au\s+\d{2}/\d{2}/\d{4}",
                ])
                .prefixes(&["releve"])
                .suffixes(&["_releve"])
                .entities(BANKS),
            CategoryRules::new(Category::Contrats)
                .keywords(&[
                    "contrat",
                    "conditions generales",
                    "conditions particulieres",
                    "signataire",
                    "resiliation",
                    "souscription",
                    "avenant",
                ])
                .patterns(&[
                    r"contrat\s+(de|d')\s*\w+",
                    r"article\s+\d+",
                    r"fait\s+a\s+\w+.{0,20}\ble\b",
                ])
                .prefixes(&["contrat", "contract"])
                .suffixes(&["_contrat"]),
            CategoryRules::new(Category::Attestations)
                .keywords(&[
                    "attestation",
                    "atteste",
                    "certifie",
                    "pour servir et valoir ce que de droit",
                    "justificatif",
                ])
                .patterns(&[
                    r"je\s+soussigne",
                    r"atteste\s+(que|sur)",
                    r"attestation\s+d[e']\s*\w+",
                ])
                .prefixes(&["attestation", "attest_"])
                .suffixes(&["_attestation"])
                .entities(&["caf", "france travail", "pole emploi", "cpam", "urssaf"]),
            CategoryRules::new(Category::Courriers)
                .weight(0.8)
                .keywords(&[
                    "madame",
                    "monsieur",
                    "cordialement",
                    "objet",
                    "salutations",
                    "lettre",
                ])
                .patterns(&[r"objet\s*:", r"veuillez\s+agreer", r"(madame|monsieur),"])
                .prefixes(&["courrier", "lettre"])
                .suffixes(&["_courrier", "_lettre"]),
            CategoryRules::new(Category::Rapports)
                .keywords(&[
                    "rapport",
                    "analyse",
                    "conclusion",
                    "synthese",
                    "recommandations",
                    "sommaire",
                    "annexe",
                ])
                .patterns(&[r"rapport\s+(d'|de\s+)\w+", r"table\s+des\s+matieres"])
                .prefixes(&["rapport", "report"])
                .suffixes(&["_rapport", "_report"]),
            CategoryRules::new(Category::Impots)
                .keywords(&[
                    "impot",
                    "impots",
                    "avis d'imposition",
                    "revenu fiscal de reference",
                    "numero fiscal",
                    "taxe fonciere",
                    "taxe d'habitation",
                    "prelevement a la source",
                ])
                .patterns(&[
                    r"avis\s+d'(imposition|impot)",
                    r"revenu\s+fiscal",
                    r"numero\s+fiscal\s*:?\s*\d{13}",
                ])
                .prefixes(&["impot", "avis_imposition", "taxe"])
                .suffixes(&["_impots"])
                .entities(&["direction generale des finances publiques", "dgfip"]),
            CategoryRules::new(Category::Assurances)
                .keywords(&[
                    "assurance",
                    "assure",
                    "sinistre",
                    "cotisation",
                    "garantie",
                    "franchise",
                ])
                .patterns(&[
                    r"contrat\s+d'assurance",
                    r"numero\s+de\s+(police|societaire)",
                    r"avis\s+d'echeance",
                ])
                .prefixes(&["assurance"])
                .suffixes(&["_assurance"])
                .entities(&["axa", "maif", "macif", "allianz", "groupama", "matmut", "generali"]),
            CategoryRules::new(Category::CartesTransport)
                .keywords(&["navigo", "titre de transport", "carte de transport", "forfait"])
                .patterns(&[
                    r"passe?\s+navigo",
                    r"titre\s+de\s+transport",
                    r"carte\s+(de\s+)?transport",
                ])
                .prefixes(&["navigo", "transport"])
                .suffixes(&["_navigo", "_transport"])
                .entities(&["ratp", "sncf", "ile-de-france mobilites", "keolis"]),
            CategoryRules::new(Category::DocumentsPersonnels)
                .weight(0.8)
                .keywords(&[
                    "carte d'identite",
                    "passeport",
                    "acte de naissance",
                    "livret de famille",
                    "permis de conduire",
                    "justificatif de domicile",
                ])
                .patterns(&[
                    r"carte\s+nationale\s+d'identite",
                    r"acte\s+de\s+(naissance|mariage)",
                ])
                .prefixes(&["cni", "passeport", "identite"])
                .suffixes(&["_cni", "_passeport"])
                .entities(&["prefecture", "ants"]),
        ];

        Self { categories }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_kind_specificity_order() {
        assert!(MatchKind::Entity > MatchKind::Pattern);
        assert!(MatchKind::Pattern > MatchKind::Affix);
        assert!(MatchKind::Affix > MatchKind::Keyword);
        assert!(MatchKind::Entity.multiplier() > MatchKind::Pattern.multiplier());
    }

    #[test]
    fn test_default_table_has_no_unclassified_entry() {
        let rules = RuleSet::default();
        assert!(rules.categories().all(|c| !c.is_unclassified()));
        assert_eq!(rules.categories.len(), Category::FIXED.len() - 1);
    }

    #[test]
    fn test_rule_set_from_json_defaults_weight() {
        let json = r#"{"categories":[{"category":"notes_de_frais","keywords":["note de frais"]}]}"#;
        let rules = RuleSet::from_json(json).unwrap();
        assert_eq!(rules.categories.len(), 1);
        assert_eq!(rules.categories[0].base_weight, 1.0);
        assert_eq!(
            rules.categories[0].category,
            Category::Custom("notes_de_frais".to_string())
        );
    }
}
