//! Plain-text rendering of catalog records for tool results and the CLI.

use std::fmt::Write;

use crate::models::{
    CourseRecord, CourseSummary, DepartmentSummary, Instructor, Meeting, SchoolSummary,
    SectionRecord,
};

const IND: &str = "    ";

const SEARCH_NOTE: &str = "Note: search_courses is for exploring and finding courses. It returns \
only summary fields (name, description, units). To retrieve all details about a course \
(instructors, schedule, requirements, etc.), use the get_course tool.";

fn or_none(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => "None",
    }
}

fn units_label(min: u32, max: u32) -> String {
    if min == max {
        max.to_string()
    } else {
        format!("{} - {}", min, max)
    }
}

pub fn course_summary(course: &CourseSummary) -> String {
    format!(
        "{}{} | id: {} | {} units\n{}\n\n{}\n",
        course.department,
        course.number,
        course.course_id,
        units_label(course.units_min, course.units_max),
        course.title,
        course.description
    )
}

pub fn search_results(courses: &[CourseSummary]) -> String {
    let mut out = format!("{}\n\nResults:", SEARCH_NOTE);
    if courses.is_empty() {
        out.push_str("\n\n(no matching courses)");
    }
    for course in courses {
        out.push_str("\n\n");
        out.push_str(&course_summary(course));
    }
    out
}

fn instructors<'a>(list: impl IntoIterator<Item = &'a Instructor>, indent: &str) -> String {
    let lines: Vec<String> = list
        .into_iter()
        .map(|i| {
            let sunet = i.sunet.as_deref().map(|s| format!(" [{}]", s)).unwrap_or_default();
            let pi = if i.role.as_deref() == Some("PI") { " (PI)" } else { "" };
            format!("{}- {}{}{}", indent, i.name, sunet, pi)
        })
        .collect();
    if lines.is_empty() {
        format!("{}- (none)", indent)
    } else {
        lines.join("\n")
    }
}

fn schedules(meetings: &[Meeting], indent: &str) -> String {
    if meetings.is_empty() {
        return format!("{}(none)", indent);
    }
    let i2 = format!("{}{}", indent, IND);
    let mut out = Vec::new();
    for (idx, m) in meetings.iter().enumerate() {
        out.push(format!("{}- Schedule #{}:", indent, idx + 1));
        out.push(format!(
            "{}dates: {} -> {}",
            i2,
            or_none(m.start_date.as_deref()),
            or_none(m.end_date.as_deref())
        ));
        out.push(format!(
            "{}time: {} - {}",
            i2,
            or_none(m.start_time.as_deref()),
            or_none(m.end_time.as_deref())
        ));
        out.push(format!("{}location: {}", i2, or_none(m.location.as_deref())));
        out.push(format!("{}days: {}", i2, m.days.join(", ")));
    }
    out.join("\n")
}

pub fn sections(list: &[SectionRecord]) -> String {
    if list.is_empty() {
        return format!("{}- (none)", IND);
    }
    let i2 = IND.repeat(2);
    let i3 = IND.repeat(3);
    let mut out = Vec::new();
    for (idx, s) in list.iter().enumerate() {
        out.push(format!(
            "{}- Section #{}: {} {} (class_id: {})",
            IND,
            idx + 1,
            s.component,
            s.section_number,
            s.section_id
        ));
        out.push(format!("{}term: {}", i2, s.term));
        out.push(format!("{}units: {}", i2, s.units));
        out.push(format!(
            "{}enrollment: {}/{}",
            i2, s.enrollment_current, s.enrollment_cap
        ));
        out.push(format!("{}waitlist: {}/{}", i2, s.waitlist_current, s.waitlist_cap));
        if let Some(notes) = s.notes.as_deref().filter(|n| !n.is_empty()) {
            out.push(format!("{}notes: {}", i2, notes));
        }
        out.push(format!("{}instructors:", i2));
        out.push(instructors(&s.instructors, &i3));
        out.push(format!("{}schedules:", i2));
        out.push(schedules(&s.schedule, &i3));
    }
    out.join("\n")
}

pub fn course_detail(course: &CourseRecord) -> String {
    let mut out = String::from("# Course\n");
    let _ = writeln!(out, "course_id: {}", course.course_id);
    let _ = writeln!(out, "term: {}", course.term);
    let _ = writeln!(out, "subject: {}", course.department);
    let _ = writeln!(out, "code: {}", course.number);
    let _ = writeln!(out, "title: {}", course.title);
    let _ = writeln!(out, "description: {}", course.description);
    let _ = writeln!(out, "gers: {}", course.gers.join(", "));
    let _ = writeln!(out, "repeatable: {}", course.repeatable);
    let _ = writeln!(out, "grading_basis: {}", or_none(course.grading_basis.as_deref()));
    let _ = writeln!(out, "units_min: {}", course.units_min);
    let _ = writeln!(out, "units_max: {}", course.units_max);
    let _ = writeln!(out, "final_exam: {}", course.final_exam);
    let _ = writeln!(out, "academic_career: {}", or_none(course.academic_career.as_deref()));
    let _ = write!(out, "\nsections:\n{}\n", sections(&course.sections));
    out
}

pub fn schedule(course: &CourseRecord, list: &[SectionRecord]) -> String {
    format!(
        "{} ({}) {}\n\nsections:\n{}\n",
        course.code(),
        course.course_id,
        course.term,
        sections(list)
    )
}

pub fn schools(list: &[SchoolSummary]) -> String {
    let mut out = String::from("Schools:");
    for school in list {
        let _ = write!(out, "\n - {}", school.name);
        if let Some(count) = school.department_count {
            let plural = if count == 1 { "" } else { "s" };
            let _ = write!(out, " ({} department{})", count, plural);
        }
    }
    out
}

/// Departments grouped under their school headings, in listing order
pub fn departments(list: &[DepartmentSummary]) -> String {
    let mut out = String::new();
    let mut current: Option<&str> = None;
    for dept in list {
        if current != Some(dept.school.as_str()) {
            if current.is_some() {
                out.push('\n');
            }
            let _ = write!(out, "{}", dept.school);
            current = Some(dept.school.as_str());
        }
        let _ = write!(out, "\n - {} ({})", dept.name, dept.code);
    }
    if out.is_empty() {
        out.push_str("(no departments)");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_summary_header() {
        let summary = CourseSummary {
            course_id: "105645".into(),
            code: "CS 106A".into(),
            department: "CS".into(),
            number: "106A".into(),
            title: "Programming Methodology".into(),
            description: "Intro.".into(),
            units_min: 3,
            units_max: 5,
        };
        let text = course_summary(&summary);
        assert!(text.starts_with("CS106A | id: 105645 | 3 - 5 units\nProgramming Methodology"));
    }

    #[test]
    fn test_schools_pluralization() {
        let list = vec![
            SchoolSummary { name: "Law School".into(), department_count: Some(1) },
            SchoolSummary { name: "School of Engineering".into(), department_count: Some(9) },
        ];
        assert_eq!(
            schools(&list),
            "Schools:\n - Law School (1 department)\n - School of Engineering (9 departments)"
        );
    }

    #[test]
    fn test_departments_grouped_by_school() {
        let list = vec![
            DepartmentSummary { code: "CS".into(), name: "Computer Science".into(), school: "Engineering".into() },
            DepartmentSummary { code: "EE".into(), name: "Electrical Engineering".into(), school: "Engineering".into() },
            DepartmentSummary { code: "LAW".into(), name: "Law".into(), school: "Law School".into() },
        ];
        assert_eq!(
            departments(&list),
            "Engineering\n - Computer Science (CS)\n - Electrical Engineering (EE)\nLaw School\n - Law (LAW)"
        );
    }
}
