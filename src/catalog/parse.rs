//! Normalization of ExploreCourses XML payloads into typed records.
//!
//! Parsing is lenient: missing or empty elements become defaults and
//! unparsable numbers read as zero. Only a payload that is not XML at all
//! is rejected.

use quick_xml::de::from_str;
use serde::Deserialize;
use std::collections::BTreeSet;

use crate::models::{CourseRecord, Department, Instructor, Meeting, School, SectionRecord, Term};
use crate::sources::SourceError;

#[derive(Debug, Deserialize, Default)]
struct XmlRoot {
    #[serde(default)]
    courses: XmlCourses,
}

#[derive(Debug, Deserialize, Default)]
struct XmlCourses {
    #[serde(rename = "course", default)]
    items: Vec<XmlCourse>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct XmlCourse {
    subject: String,
    code: String,
    title: String,
    description: String,
    gers: String,
    repeatable: String,
    grading: String,
    units_min: String,
    units_max: String,
    sections: XmlSections,
    administrative_information: XmlAdmin,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct XmlAdmin {
    course_id: String,
    academic_career: String,
    final_exam_flag: String,
}

#[derive(Debug, Deserialize, Default)]
struct XmlSections {
    #[serde(rename = "section", default)]
    items: Vec<XmlSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct XmlSection {
    class_id: String,
    term: String,
    units: String,
    section_number: String,
    component: String,
    current_class_size: String,
    max_class_size: String,
    current_waitlist_size: String,
    max_waitlist_size: String,
    notes: String,
    schedules: XmlSchedules,
}

#[derive(Debug, Deserialize, Default)]
struct XmlSchedules {
    #[serde(rename = "schedule", default)]
    items: Vec<XmlSchedule>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct XmlSchedule {
    start_date: String,
    end_date: String,
    start_time: String,
    end_time: String,
    location: String,
    days: String,
    instructors: XmlInstructors,
}

#[derive(Debug, Deserialize, Default)]
struct XmlInstructors {
    #[serde(rename = "instructor", default)]
    items: Vec<XmlInstructor>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct XmlInstructor {
    name: String,
    first_name: String,
    last_name: String,
    sunet: String,
    role: String,
}

#[derive(Debug, Deserialize, Default)]
struct XmlSchools {
    #[serde(rename = "school", default)]
    items: Vec<XmlSchool>,
}

#[derive(Debug, Deserialize, Default)]
struct XmlSchool {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "department", default)]
    departments: Vec<XmlDepartment>,
}

#[derive(Debug, Deserialize, Default)]
struct XmlDepartment {
    #[serde(rename = "@name", default)]
    code: String,
    #[serde(rename = "@longname", default)]
    longname: String,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn number(value: &str) -> u32 {
    value.trim().parse().unwrap_or(0)
}

fn flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "y" | "yes" | "true")
}

impl XmlInstructor {
    fn into_instructor(self) -> Option<Instructor> {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let name = non_empty(full).or_else(|| non_empty(self.name))?;
        Some(Instructor {
            name,
            sunet: non_empty(self.sunet),
            role: non_empty(self.role),
        })
    }
}

impl XmlSection {
    fn into_record(self) -> SectionRecord {
        let mut instructors = BTreeSet::new();
        let mut schedule = Vec::with_capacity(self.schedules.items.len());

        for meeting in self.schedules.items {
            instructors.extend(
                meeting
                    .instructors
                    .items
                    .into_iter()
                    .filter_map(XmlInstructor::into_instructor),
            );
            schedule.push(Meeting {
                days: meeting.days.split_whitespace().map(str::to_string).collect(),
                start_time: non_empty(meeting.start_time),
                end_time: non_empty(meeting.end_time),
                start_date: non_empty(meeting.start_date),
                end_date: non_empty(meeting.end_date),
                location: non_empty(meeting.location),
            });
        }

        SectionRecord {
            section_id: self.class_id.trim().to_string(),
            component: self.component.trim().to_string(),
            section_number: self.section_number.trim().to_string(),
            term: self.term.trim().to_string(),
            units: self.units.trim().to_string(),
            instructors,
            schedule,
            enrollment_cap: number(&self.max_class_size),
            enrollment_current: number(&self.current_class_size),
            waitlist_cap: number(&self.max_waitlist_size),
            waitlist_current: number(&self.current_waitlist_size),
            notes: non_empty(self.notes),
        }
    }
}

impl XmlCourse {
    fn into_record(self, term: &Term) -> CourseRecord {
        let sections = self
            .sections
            .items
            .into_iter()
            .filter(|s| s.term.trim().is_empty() || term.matches_label(&s.term))
            .map(XmlSection::into_record)
            .collect();

        CourseRecord {
            course_id: self.administrative_information.course_id.trim().to_string(),
            department: self.subject.trim().to_string(),
            number: self.code.trim().to_string(),
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            units_min: number(&self.units_min),
            units_max: number(&self.units_max),
            term: term.to_string(),
            gers: self
                .gers
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect(),
            grading_basis: non_empty(self.grading),
            repeatable: flag(&self.repeatable),
            academic_career: non_empty(self.administrative_information.academic_career),
            final_exam: flag(&self.administrative_information.final_exam_flag),
            sections,
        }
    }
}

/// Parse a course search payload, keeping upstream order.
///
/// Sections are narrowed to `term`; records without subject or code are dropped.
pub fn parse_courses(xml: &str, term: &Term) -> Result<Vec<CourseRecord>, SourceError> {
    let root: XmlRoot = from_str(xml)?;
    let total = root.courses.items.len();

    let courses: Vec<CourseRecord> = root
        .courses
        .items
        .into_iter()
        .filter(|c| !c.subject.trim().is_empty() && !c.code.trim().is_empty())
        .map(|c| c.into_record(term))
        .collect();

    if courses.len() < total {
        tracing::debug!(dropped = total - courses.len(), "Dropped malformed course records");
    }
    Ok(courses)
}

/// Parse a school listing payload
pub fn parse_schools(xml: &str) -> Result<Vec<School>, SourceError> {
    let root: XmlSchools = from_str(xml)?;
    Ok(root
        .items
        .into_iter()
        .filter_map(|school| {
            let name = non_empty(school.name)?;
            let departments = school
                .departments
                .into_iter()
                .filter_map(|d| {
                    let code = non_empty(d.code)?;
                    let name = non_empty(d.longname).unwrap_or_else(|| code.clone());
                    Some(Department { code, name })
                })
                .collect();
            Some(School { name, departments })
        })
        .collect())
}
