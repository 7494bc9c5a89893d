//! Table and column naming at the store boundary

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Maps full names to stored names and back
pub trait NameMangler: Send + Sync {
    fn mangle(&self, name: &str) -> String;
    fn unmangle(&self, name: &str) -> String;
}

/// Stores names as they are
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl NameMangler for Verbatim {
    fn mangle(&self, name: &str) -> String {
        name.to_string()
    }

    fn unmangle(&self, name: &str) -> String {
        name.to_string()
    }
}

/// Long MEDLINE segment names and their stored abbreviations
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("MedlineCitation", "MedCit"),
    ("Article", "Art"),
    ("AuthorList", "AuthList"),
    ("Author", "Auth"),
    ("AffiliationInfo", "AffInf"),
    ("Affiliation", "Aff"),
    ("Identifier", "Ident"),
    ("Abstract", "Abs"),
    ("AbstractText", "AbsTxt"),
    ("Journal", "Jour"),
    ("JournalIssue", "JourIss"),
    ("PubDate", "PubDt"),
    ("MeshHeadingList", "MeshHeadList"),
    ("MeshHeading", "MeshHead"),
    ("QualifierName", "QualName"),
    ("DescriptorName", "DescName"),
    ("ChemicalList", "ChemList"),
    ("Chemical", "Chem"),
    ("NameOfSubstance", "NameOfSubst"),
    ("RegistryNumber", "RegNum"),
    ("CommentsCorrectionsList", "CommCorrList"),
    ("CommentsCorrections", "CommCorr"),
    ("PublicationTypeList", "PubTypeList"),
    ("PublicationType", "PubType"),
    ("GrantList", "GrList"),
    ("Grant", "Gr"),
    ("KeywordList", "KwList"),
    ("Keyword", "Kw"),
    ("MedlineJournalInfo", "MedJourInfo"),
    ("SupplMeshList", "SupMeshList"),
    ("SupplMeshName", "SupMeshName"),
    ("DataBankList", "DbList"),
    ("DataBank", "Db"),
    ("AccessionNumberList", "AccNumList"),
    ("AccessionNumber", "AccNum"),
    ("InvestigatorList", "InvList"),
    ("Investigator", "Inv"),
    ("OtherAbstract", "OthAbs"),
    ("PersonalNameSubjectList", "PersNameSubjList"),
    ("PersonalNameSubject", "PersNameSubj"),
    ("GeneralNote", "GenNote"),
    ("ELocationID", "ELocId"),
    ("ArticleDate", "ArtDate"),
    ("DateCompleted", "DateCompl"),
    ("DateRevised", "DateRev"),
];

static EXPAND: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| ABBREVIATIONS.iter().map(|&(term, abbr)| (abbr, term)).collect());

static SHORTEN: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| ABBREVIATIONS.iter().copied().collect());

/// Whole-segment abbreviation of separator-joined names.
///
/// Only complete segments are replaced, so `Article` shortens inside
/// `MedlineCitation_Article_Title` but not inside `ArticleDate`.
#[derive(Debug, Clone)]
pub struct Abbreviator {
    separator: String,
}

impl Abbreviator {
    pub fn new(separator: impl Into<String>) -> Self {
        Abbreviator {
            separator: separator.into(),
        }
    }

    fn map_segments(&self, name: &str, table: &HashMap<&'static str, &'static str>) -> String {
        name.split(self.separator.as_str())
            .map(|segment| table.get(segment).copied().unwrap_or(segment))
            .collect::<Vec<_>>()
            .join(&self.separator)
    }
}

impl Default for Abbreviator {
    fn default() -> Self {
        Abbreviator::new("_")
    }
}

impl NameMangler for Abbreviator {
    fn mangle(&self, name: &str) -> String {
        self.map_segments(name, &SHORTEN)
    }

    fn unmangle(&self, name: &str) -> String {
        self.map_segments(name, &EXPAND)
    }
}

/// Mangler for a store: abbreviating or verbatim
pub fn name_mangler(abbreviate: bool, separator: &str) -> Box<dyn NameMangler> {
    if abbreviate {
        Box::new(Abbreviator::new(separator))
    } else {
        Box::new(Verbatim)
    }
}
