//! Catalog query value object, terms, filters and the canonical cache key.
//!
//! A [`Query`] can only be obtained through validation ([`Query::from_params`]
//! or [`QueryBuilder::build`]), so every value in circulation is well-formed
//! and already canonicalized.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::CourseRecord;

/// Errors raised while building a query from client input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("term is required")]
    MissingTerm,

    #[error("invalid term '{0}': expected e.g. '2024-2025 Autumn' or 'Winter'")]
    InvalidTerm(String),

    #[error("invalid academic year '{0}': expected e.g. '2024-2025'")]
    InvalidYear(String),

    #[error("unknown {group} filter '{value}'")]
    InvalidFilter { group: FilterGroup, value: String },

    #[error("query needs at least one of department, number or keyword")]
    Unconstrained,

    #[error("invalid course id '{0}': expected a numeric id or a code such as 'CS 106A'")]
    InvalidCourseRef(String),
}

/// Academic quarter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quarter {
    Autumn,
    Winter,
    Spring,
    Summer,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [
        Quarter::Autumn,
        Quarter::Winter,
        Quarter::Spring,
        Quarter::Summer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Quarter::Autumn => "Autumn",
            Quarter::Winter => "Winter",
            Quarter::Spring => "Spring",
            Quarter::Summer => "Summer",
        }
    }

    /// Case-insensitive parse; "fall" is accepted as Autumn
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "autumn" | "fall" => Some(Quarter::Autumn),
            "winter" => Some(Quarter::Winter),
            "spring" => Some(Quarter::Spring),
            "summer" => Some(Quarter::Summer),
            _ => None,
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Academic year identified by its starting calendar year ("2024-2025" starts in 2024)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AcademicYear {
    start: u16,
}

impl AcademicYear {
    pub fn new(start: u16) -> Self {
        Self { start }
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    /// The `academicYear` request parameter, e.g. "20242025"
    pub fn upstream_param(&self) -> String {
        format!("{}{}", self.start, self.start + 1)
    }
}

impl FromStr for AcademicYear {
    type Err = QueryError;

    /// Accepts "2024-2025" and "20242025"; the second year must follow the first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || QueryError::InvalidYear(trimmed.to_string());

        let (first, second) = match trimmed.split_once('-') {
            Some((a, b)) => (a.trim(), b.trim()),
            None if trimmed.len() == 8 && trimmed.is_ascii() => trimmed.split_at(4),
            None => return Err(invalid()),
        };

        let start: u16 = first.parse().map_err(|_| invalid())?;
        let end: u16 = second.parse().map_err(|_| invalid())?;
        if first.len() != 4 || start.checked_add(1) != Some(end) {
            return Err(invalid());
        }
        Ok(Self { start })
    }
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.start + 1)
    }
}

impl TryFrom<String> for AcademicYear {
    type Error = QueryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AcademicYear> for String {
    fn from(year: AcademicYear) -> Self {
        year.to_string()
    }
}

/// An academic term: year plus quarter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Term {
    pub year: AcademicYear,
    pub quarter: Quarter,
}

impl Term {
    pub fn new(year: AcademicYear, quarter: Quarter) -> Self {
        Self { year, quarter }
    }

    /// Parse a term. A bare quarter takes `default_year`.
    ///
    /// Accepted: "2024-2025 Autumn", "Autumn 2024-2025", "20242025 autumn", "Winter".
    pub fn parse(input: &str, default_year: Option<AcademicYear>) -> Result<Self, QueryError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(QueryError::MissingTerm);
        }
        let invalid = || QueryError::InvalidTerm(trimmed.to_string());

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        match parts.as_slice() {
            [quarter] => {
                let quarter = Quarter::parse(quarter).ok_or_else(invalid)?;
                let year = default_year.ok_or_else(invalid)?;
                Ok(Self { year, quarter })
            }
            [a, b] => {
                if let Some(quarter) = Quarter::parse(b) {
                    let year = a.parse().map_err(|_| invalid())?;
                    Ok(Self { year, quarter })
                } else if let Some(quarter) = Quarter::parse(a) {
                    let year = b.parse().map_err(|_| invalid())?;
                    Ok(Self { year, quarter })
                } else {
                    Err(invalid())
                }
            }
            _ => Err(invalid()),
        }
    }

    /// Whether an upstream term label ("2024-2025 Autumn") names this term
    pub fn matches_label(&self, label: &str) -> bool {
        Term::parse(label, None).map(|t| t == *self).unwrap_or(false)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.year, self.quarter)
    }
}

/// Filter groups understood by the catalog search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterGroup {
    UgReqs,
    Units,
    Times,
    Days,
    Careers,
}

impl FilterGroup {
    pub const ALL: [FilterGroup; 5] = [
        FilterGroup::UgReqs,
        FilterGroup::Units,
        FilterGroup::Times,
        FilterGroup::Days,
        FilterGroup::Careers,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            FilterGroup::UgReqs => "ug_reqs",
            FilterGroup::Units => "units",
            FilterGroup::Times => "times",
            FilterGroup::Days => "days",
            FilterGroup::Careers => "careers",
        }
    }

    /// Optional alias prefix, e.g. `units_3` or `day_monday`
    fn alias_prefix(&self) -> Option<&'static str> {
        match self {
            FilterGroup::UgReqs => None,
            FilterGroup::Units => Some("units_"),
            FilterGroup::Times => Some("time_"),
            FilterGroup::Days => Some("day_"),
            FilterGroup::Careers => Some("career_"),
        }
    }

    /// Canonical values of this group
    pub fn values(&self) -> impl Iterator<Item = &'static str> + '_ {
        FILTERS
            .iter()
            .filter(move |(group, _, _)| group == self)
            .map(|(_, name, _)| *name)
    }
}

impl fmt::Display for FilterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// (group, canonical value, upstream parameter)
const FILTERS: &[(FilterGroup, &str, &str)] = &[
    (FilterGroup::UgReqs, "LANGUAGE", "filter-ger-Language"),
    (FilterGroup::UgReqs, "WRITING1", "filter-ger-Writing1"),
    (FilterGroup::UgReqs, "WRITING2", "filter-ger-Writing2"),
    (FilterGroup::UgReqs, "WRITINGSLE", "filter-ger-WritingSLE"),
    (FilterGroup::UgReqs, "WAY_AII", "filter-ger-WAYAII"),
    (FilterGroup::UgReqs, "WAY_AQR", "filter-ger-WAYAQR"),
    (FilterGroup::UgReqs, "WAY_CE", "filter-ger-WAYCE"),
    (FilterGroup::UgReqs, "WAY_ED", "filter-ger-WAYED"),
    (FilterGroup::UgReqs, "WAY_ER", "filter-ger-WAYER"),
    (FilterGroup::UgReqs, "WAY_FR", "filter-ger-WAYFR"),
    (FilterGroup::UgReqs, "WAY_SI", "filter-ger-WAYSI"),
    (FilterGroup::UgReqs, "WAY_SMA", "filter-ger-WAYSMA"),
    (FilterGroup::Units, "1", "filter-units-1"),
    (FilterGroup::Units, "2", "filter-units-2"),
    (FilterGroup::Units, "3", "filter-units-3"),
    (FilterGroup::Units, "4", "filter-units-4"),
    (FilterGroup::Units, "5", "filter-units-5"),
    (FilterGroup::Units, "GT5", "filter-units-gt5"),
    (FilterGroup::Times, "EARLY_MORNING", "filter-time-EarlyMorning"),
    (FilterGroup::Times, "MORNING", "filter-time-Morning"),
    (FilterGroup::Times, "LUNCHTIME", "filter-time-Lunchtime"),
    (FilterGroup::Times, "AFTERNOON", "filter-time-Afternoon"),
    (FilterGroup::Times, "EVENING", "filter-time-Evening"),
    (FilterGroup::Days, "SUNDAY", "filter-day-Sunday"),
    (FilterGroup::Days, "MONDAY", "filter-day-Monday"),
    (FilterGroup::Days, "TUESDAY", "filter-day-Tuesday"),
    (FilterGroup::Days, "WEDNESDAY", "filter-day-Wednesday"),
    (FilterGroup::Days, "THURSDAY", "filter-day-Thursday"),
    (FilterGroup::Days, "FRIDAY", "filter-day-Friday"),
    (FilterGroup::Days, "SATURDAY", "filter-day-Saturday"),
    (FilterGroup::Careers, "UG", "filter-academiclevel-UG"),
    (FilterGroup::Careers, "GR", "filter-academiclevel-GR"),
    (FilterGroup::Careers, "GSB", "filter-academiclevel-GSB"),
    (FilterGroup::Careers, "LAW", "filter-academiclevel-LAW"),
    (FilterGroup::Careers, "MED", "filter-academiclevel-MED"),
];

/// A single upstream search filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CourseFilter {
    group: FilterGroup,
    name: &'static str,
    param: &'static str,
}

impl CourseFilter {
    /// Resolve a client-supplied value within a group, ignoring case and the group's alias prefix.
    pub fn parse(group: FilterGroup, raw: &str) -> Result<Self, QueryError> {
        let upper = raw.trim().to_ascii_uppercase();
        let value = group
            .alias_prefix()
            .and_then(|prefix| upper.strip_prefix(&prefix.to_ascii_uppercase()))
            .unwrap_or(&upper);

        FILTERS
            .iter()
            .find(|(g, name, _)| *g == group && *name == value)
            .map(|&(group, name, param)| Self { group, name, param })
            .ok_or_else(|| QueryError::InvalidFilter {
                group,
                value: raw.trim().to_string(),
            })
    }

    pub fn group(&self) -> FilterGroup {
        self.group
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Upstream request parameter (sent with value "on")
    pub fn param(&self) -> &'static str {
        self.param
    }
}

impl fmt::Display for CourseFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

/// Raw query parameters as supplied by a client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryParams {
    pub term: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub ug_reqs: Vec<String>,
    #[serde(default)]
    pub units: Vec<String>,
    #[serde(default)]
    pub times: Vec<String>,
    #[serde(default)]
    pub days: Vec<String>,
    #[serde(default)]
    pub careers: Vec<String>,
}

impl QueryParams {
    fn filter_values(&self, group: FilterGroup) -> &[String] {
        match group {
            FilterGroup::UgReqs => &self.ug_reqs,
            FilterGroup::Units => &self.units,
            FilterGroup::Times => &self.times,
            FilterGroup::Days => &self.days,
            FilterGroup::Careers => &self.careers,
        }
    }
}

/// Canonical, deterministic cache key for a query
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated catalog query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    term: Term,
    department: Option<String>,
    number: Option<String>,
    keyword: Option<String>,
    filters: BTreeSet<CourseFilter>,
}

impl Query {
    pub fn builder(term: Term) -> QueryBuilder {
        QueryBuilder::new(term)
    }

    /// Validate client parameters into a query
    pub fn from_params(
        params: &QueryParams,
        default_year: Option<AcademicYear>,
    ) -> Result<Self, QueryError> {
        let term = Term::parse(&params.term, default_year)?;
        let mut builder = QueryBuilder::new(term);
        builder.department = params.department.clone();
        builder.number = params.number.clone();
        builder.keyword = params.keyword.clone();

        for group in FilterGroup::ALL {
            for raw in params.filter_values(group) {
                builder.filters.insert(CourseFilter::parse(group, raw)?);
            }
        }

        builder.build()
    }

    pub fn term(&self) -> Term {
        self.term
    }

    pub fn department(&self) -> Option<&str> {
        self.department.as_deref()
    }

    pub fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }

    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref()
    }

    pub fn filters(&self) -> impl Iterator<Item = &CourseFilter> {
        self.filters.iter()
    }

    /// The free-text `q` parameter sent upstream
    pub fn search_text(&self) -> String {
        if let Some(keyword) = &self.keyword {
            return keyword.clone();
        }
        match (&self.department, &self.number) {
            (Some(dept), Some(number)) => format!("{}{}", dept, number),
            (Some(dept), None) => dept.clone(),
            (None, Some(number)) => number.clone(),
            (None, None) => String::new(),
        }
    }

    /// Whether a course satisfies the department/number constraints of this query
    pub fn matches(&self, course: &CourseRecord) -> bool {
        let dept_ok = self
            .department
            .as_deref()
            .map_or(true, |dept| course.department.eq_ignore_ascii_case(dept));
        let number_ok = self
            .number
            .as_deref()
            .map_or(true, |number| course.number.eq_ignore_ascii_case(number));
        dept_ok && number_ok
    }

    pub fn cache_key(&self) -> CacheKey {
        #[derive(Serialize)]
        struct KeyParts {
            term: String,
            dept: Option<String>,
            number: Option<String>,
            keyword: Option<String>,
            filters: Vec<String>,
        }

        let parts = KeyParts {
            term: self.term.to_string().to_lowercase(),
            dept: self.department.as_ref().map(|s| s.to_lowercase()),
            number: self.number.as_ref().map(|s| s.to_lowercase()),
            keyword: self.keyword.as_ref().map(|s| s.to_lowercase()),
            filters: self.filters.iter().map(|f| f.to_string().to_lowercase()).collect(),
        };
        // JSON string escaping keeps the rendering injective
        CacheKey(serde_json::to_string(&parts).unwrap_or_else(|_| format!("{:?}", self)))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.term)?;
        if let Some(dept) = &self.department {
            write!(f, " dept={}", dept)?;
        }
        if let Some(number) = &self.number {
            write!(f, " number={}", number)?;
        }
        if let Some(keyword) = &self.keyword {
            write!(f, " keyword={:?}", keyword)?;
        }
        for filter in &self.filters {
            write!(f, " {}", filter)?;
        }
        Ok(())
    }
}

/// Builder for [`Query`]; `build` canonicalizes and validates
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    term: Term,
    department: Option<String>,
    number: Option<String>,
    keyword: Option<String>,
    filters: BTreeSet<CourseFilter>,
}

impl QueryBuilder {
    pub fn new(term: Term) -> Self {
        Self {
            term,
            department: None,
            number: None,
            keyword: None,
            filters: BTreeSet::new(),
        }
    }

    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn number(mut self, number: impl Into<String>) -> Self {
        self.number = Some(number.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn filter(mut self, filter: CourseFilter) -> Self {
        self.filters.insert(filter);
        self
    }

    pub fn build(self) -> Result<Query, QueryError> {
        let department = collapse(self.department).map(|s| s.replace(' ', "").to_ascii_uppercase());
        let number = collapse(self.number).map(|s| s.replace(' ', "").to_ascii_uppercase());
        let keyword = collapse(self.keyword);

        if department.is_none() && number.is_none() && keyword.is_none() {
            return Err(QueryError::Unconstrained);
        }

        Ok(Query {
            term: self.term,
            department,
            number,
            keyword,
            filters: self.filters,
        })
    }
}

/// Trim and collapse internal whitespace; empty becomes `None`
fn collapse(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
}

/// A reference to one course: numeric ExploreCourses id or a code like "CS 106A"
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CourseRef {
    Id(String),
    Code { department: String, number: String },
}

fn course_code_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z&]+(?:\s+[A-Za-z&]+)*?)\s*(\d+[A-Za-z]*)$").ok())
        .as_ref()
}

impl CourseRef {
    /// Build the search that locates this course in a term
    pub fn to_query(&self, term: Term) -> Result<Query, QueryError> {
        match self {
            CourseRef::Id(id) => Query::builder(term).keyword(id.clone()).build(),
            CourseRef::Code { department, number } => Query::builder(term)
                .department(department.clone())
                .number(number.clone())
                .build(),
        }
    }

    pub fn matches(&self, course: &CourseRecord) -> bool {
        match self {
            CourseRef::Id(id) => course.course_id == *id,
            CourseRef::Code { department, number } => {
                course.department.eq_ignore_ascii_case(department)
                    && course.number.eq_ignore_ascii_case(number)
            }
        }
    }
}

impl FromStr for CourseRef {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Ok(CourseRef::Id(trimmed.to_string()));
        }

        let caps = course_code_regex()
            .and_then(|re| re.captures(trimmed))
            .ok_or_else(|| QueryError::InvalidCourseRef(trimmed.to_string()))?;
        Ok(CourseRef::Code {
            department: caps[1].replace(' ', "").to_ascii_uppercase(),
            number: caps[2].to_ascii_uppercase(),
        })
    }
}

impl fmt::Display for CourseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CourseRef::Id(id) => f.write_str(id),
            CourseRef::Code { department, number } => write!(f, "{} {}", department, number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn autumn() -> Term {
        Term::new(AcademicYear::new(2024), Quarter::Autumn)
    }

    #[test]
    fn test_term_spellings() {
        let expected = autumn();
        for input in [
            "2024-2025 Autumn",
            "Autumn 2024-2025",
            "2024-2025 autumn",
            "20242025 Autumn",
            "2024-2025 Fall",
        ] {
            assert_eq!(Term::parse(input, None).unwrap(), expected, "{}", input);
        }
        assert_eq!(expected.to_string(), "2024-2025 Autumn");
    }

    #[test]
    fn test_bare_quarter_uses_default_year() {
        let year = AcademicYear::new(2025);
        let term = Term::parse("winter", Some(year)).unwrap();
        assert_eq!(term, Term::new(year, Quarter::Winter));

        assert!(matches!(
            Term::parse("winter", None),
            Err(QueryError::InvalidTerm(_))
        ));
    }

    #[test]
    fn test_invalid_terms() {
        assert_eq!(Term::parse("  ", None), Err(QueryError::MissingTerm));
        assert!(Term::parse("2024-2026 Autumn", None).is_err());
        assert!(Term::parse("2024-2025 Monsoon", None).is_err());
        assert!(Term::parse("Autumn Winter", None).is_err());
    }

    #[test]
    fn test_academic_year_param() {
        let year: AcademicYear = "2023-2024".parse().unwrap();
        assert_eq!(year.upstream_param(), "20232024");
        assert_eq!("20232024".parse::<AcademicYear>().unwrap(), year);
    }

    #[test]
    fn test_filter_aliases() {
        let a = CourseFilter::parse(FilterGroup::Units, "units_3").unwrap();
        let b = CourseFilter::parse(FilterGroup::Units, "3").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.param(), "filter-units-3");

        let day = CourseFilter::parse(FilterGroup::Days, "Day_Monday").unwrap();
        assert_eq!(day.name(), "MONDAY");

        let career = CourseFilter::parse(FilterGroup::Careers, "career_ug").unwrap();
        assert_eq!(career.param(), "filter-academiclevel-UG");

        assert!(matches!(
            CourseFilter::parse(FilterGroup::UgReqs, "WAY_XYZ"),
            Err(QueryError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_canonical_key_ignores_case_whitespace_and_filter_order() {
        let a = QueryParams {
            term: "2024-2025 Autumn".into(),
            department: Some(" cs ".into()),
            keyword: Some("intro   programming".into()),
            days: vec!["monday".into(), "day_friday".into()],
            ..Default::default()
        };
        let b = QueryParams {
            term: "autumn 20242025".into(),
            department: Some("CS".into()),
            keyword: Some("Intro Programming".into()),
            days: vec!["FRIDAY".into(), "Monday".into(), "monday".into()],
            ..Default::default()
        };

        let qa = Query::from_params(&a, None).unwrap();
        let qb = Query::from_params(&b, None).unwrap();
        assert_eq!(qa.cache_key(), qb.cache_key());
        assert_eq!(qa.filters().count(), 2);
    }

    #[test]
    fn test_different_queries_have_different_keys() {
        let term = autumn();
        let a = Query::builder(term).department("CS").build().unwrap();
        let b = Query::builder(term).keyword("CS").build().unwrap();
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_unconstrained_query_is_rejected() {
        let params = QueryParams {
            term: "2024-2025 Autumn".into(),
            keyword: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(
            Query::from_params(&params, None),
            Err(QueryError::Unconstrained)
        );
    }

    #[test]
    fn test_search_text() {
        let term = autumn();
        let q = Query::builder(term)
            .department("cs")
            .number("106a")
            .build()
            .unwrap();
        assert_eq!(q.search_text(), "CS106A");

        let q = Query::builder(term).keyword("machine learning").build().unwrap();
        assert_eq!(q.search_text(), "machine learning");
    }

    #[test]
    fn test_course_ref_parse() {
        assert_eq!(
            "105645".parse::<CourseRef>().unwrap(),
            CourseRef::Id("105645".into())
        );
        let expected = CourseRef::Code {
            department: "CS".into(),
            number: "106A".into(),
        };
        assert_eq!("CS106A".parse::<CourseRef>().unwrap(), expected);
        assert_eq!("cs 106a".parse::<CourseRef>().unwrap(), expected);
        assert_eq!(
            "MS&E 252".parse::<CourseRef>().unwrap(),
            CourseRef::Code {
                department: "MS&E".into(),
                number: "252".into()
            }
        );
        assert!("intro to cs".parse::<CourseRef>().is_err());
    }
}
