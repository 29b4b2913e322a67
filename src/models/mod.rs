//! Core data models for catalog queries and course records.

mod course;
mod query;

pub use course::{
    CourseRecord, CourseSummary, Department, DepartmentSummary, Instructor, Meeting, School,
    SchoolSummary, SectionRecord, SUMMARY_DESCRIPTION_LIMIT,
};
pub use query::{
    AcademicYear, CacheKey, CourseFilter, CourseRef, FilterGroup, Quarter, Query, QueryBuilder,
    QueryError, QueryParams, Term,
};
