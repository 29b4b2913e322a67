//! Normalized course catalog records.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Maximum description length in a [`CourseSummary`]
pub const SUMMARY_DESCRIPTION_LIMIT: usize = 700;

const CLIPPED_SUFFIX: &str = "... (description clipped, call get_course for full details)";

/// A course offering normalized from the upstream catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    /// ExploreCourses numeric course id
    pub course_id: String,
    /// Subject code, e.g. "CS"
    pub department: String,
    /// Catalog number, e.g. "106A"
    pub number: String,
    pub title: String,
    pub description: String,
    pub units_min: u32,
    pub units_max: u32,
    /// Term the record was fetched for, e.g. "2024-2025 Autumn"
    pub term: String,
    /// General education requirements satisfied
    #[serde(default)]
    pub gers: Vec<String>,
    #[serde(default)]
    pub grading_basis: Option<String>,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub academic_career: Option<String>,
    #[serde(default)]
    pub final_exam: bool,
    pub sections: Vec<SectionRecord>,
}

impl CourseRecord {
    /// Display code, e.g. "CS 106A"
    pub fn code(&self) -> String {
        format!("{} {}", self.department, self.number)
    }

    pub fn units_label(&self) -> String {
        if self.units_min == self.units_max {
            self.units_min.to_string()
        } else {
            format!("{}-{}", self.units_min, self.units_max)
        }
    }

    pub fn summary(&self) -> CourseSummary {
        CourseSummary {
            course_id: self.course_id.clone(),
            code: self.code(),
            department: self.department.clone(),
            number: self.number.clone(),
            title: self.title.clone(),
            description: clip_description(&self.description),
            units_min: self.units_min,
            units_max: self.units_max,
        }
    }
}

fn clip_description(description: &str) -> String {
    if description.chars().count() <= SUMMARY_DESCRIPTION_LIMIT {
        return description.to_string();
    }
    let keep = SUMMARY_DESCRIPTION_LIMIT.saturating_sub(CLIPPED_SUFFIX.chars().count());
    let mut clipped: String = description.chars().take(keep).collect();
    clipped.truncate(clipped.trim_end().len());
    clipped.push_str(CLIPPED_SUFFIX);
    clipped
}

/// One section (lecture, discussion, lab...) of a course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRecord {
    /// Upstream class id
    pub section_id: String,
    /// Component code, e.g. "LEC" or "DIS"
    pub component: String,
    pub section_number: String,
    pub term: String,
    pub units: String,
    /// Instructors across all meetings, deduplicated
    pub instructors: BTreeSet<Instructor>,
    pub schedule: Vec<Meeting>,
    pub enrollment_cap: u32,
    pub enrollment_current: u32,
    #[serde(default)]
    pub waitlist_cap: u32,
    #[serde(default)]
    pub waitlist_current: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Instructor {
    pub name: String,
    #[serde(default)]
    pub sunet: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// A recurring meeting pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub days: Vec<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Compact course listing returned by searches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub course_id: String,
    pub code: String,
    pub department: String,
    pub number: String,
    pub title: String,
    pub description: String,
    pub units_min: u32,
    pub units_max: u32,
}

/// A school and its departments as listed upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct School {
    pub name: String,
    pub departments: Vec<Department>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentSummary {
    pub code: String,
    pub name: String,
    pub school: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_count: Option<usize>,
}

impl School {
    pub fn summary(&self, include_department_count: bool) -> SchoolSummary {
        SchoolSummary {
            name: self.name.clone(),
            department_count: include_department_count.then_some(self.departments.len()),
        }
    }

    pub fn department_summaries(&self) -> impl Iterator<Item = DepartmentSummary> + '_ {
        self.departments.iter().map(|d| DepartmentSummary {
            code: d.code.clone(),
            name: d.name.clone(),
            school: self.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(description: &str) -> CourseRecord {
        CourseRecord {
            course_id: "105645".into(),
            department: "CS".into(),
            number: "106A".into(),
            title: "Programming Methodology".into(),
            description: description.into(),
            units_min: 3,
            units_max: 5,
            term: "2024-2025 Autumn".into(),
            gers: vec![],
            grading_basis: None,
            repeatable: false,
            academic_career: None,
            final_exam: true,
            sections: vec![],
        }
    }

    #[test]
    fn test_summary_keeps_short_description() {
        let summary = course("Intro to programming.").summary();
        assert_eq!(summary.code, "CS 106A");
        assert_eq!(summary.description, "Intro to programming.");
    }

    #[test]
    fn test_summary_clips_long_description() {
        let long = "é".repeat(2000);
        let summary = course(&long).summary();
        assert_eq!(summary.description.chars().count(), SUMMARY_DESCRIPTION_LIMIT);
        assert!(summary.description.ends_with("call get_course for full details)"));
    }

    #[test]
    fn test_units_label() {
        let mut c = course("");
        assert_eq!(c.units_label(), "3-5");
        c.units_min = 5;
        assert_eq!(c.units_label(), "5");
    }

    #[test]
    fn test_school_summaries() {
        let school = School {
            name: "School of Engineering".into(),
            departments: vec![
                Department { code: "CS".into(), name: "Computer Science".into() },
                Department { code: "EE".into(), name: "Electrical Engineering".into() },
            ],
        };
        assert_eq!(school.summary(true).department_count, Some(2));
        assert_eq!(school.summary(false).department_count, None);

        let depts: Vec<_> = school.department_summaries().collect();
        assert_eq!(depts[1].school, "School of Engineering");
    }
}
