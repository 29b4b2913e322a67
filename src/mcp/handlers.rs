//! Tool handlers: decode validated arguments, call the catalog service and
//! shape the structured and text results.

use std::sync::Arc;

use rmcp::model::{CallToolResult, Content};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::ToolError;
use super::schema::SchemaError;
use crate::catalog::{CatalogService, FetchError};
use crate::models::{
    AcademicYear, CourseRecord, CourseRef, CourseSummary, Query, QueryError, QueryParams, Term,
};
use crate::utils::format;

/// Result of a successful handler run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Checked against the tool's output schema
    pub structured: Value,
    pub text: String,
}

impl ToolOutput {
    pub fn into_call_result(self) -> CallToolResult {
        let mut result = CallToolResult::success(vec![Content::text(self.text)]);
        result.structured_content = Some(self.structured);
        result
    }
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with arguments already validated against its input schema
    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError>;
}

fn decode<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| {
        ToolError::InvalidArguments(SchemaError {
            path: "$".to_string(),
            message: e.to_string(),
        })
    })
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Internal(e.to_string()))
}

/// Accepts "2024-2025", "20242025" or any term spelling; empty means the default year
fn academic_year(raw: Option<&str>, default: AcademicYear) -> Result<AcademicYear, QueryError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<AcademicYear>()
            .or_else(|_| Term::parse(raw, Some(default)).map(|t| t.year)),
    }
}

/// An upstream "no such thing" is an empty answer, not a failure
fn absent_on_not_found<T: Default>(result: Result<T, FetchError>) -> Result<T, FetchError> {
    match result {
        Err(FetchError::NotFound(detail)) => {
            tracing::debug!(%detail, "Upstream reported not found");
            Ok(T::default())
        }
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct CourseArgs {
    course_id: String,
    term: String,
}

/// A course lookup; `course` is `None` when nothing matches in `term`
struct Lookup {
    course_ref: CourseRef,
    term: Term,
    course: Option<CourseRecord>,
}

impl Lookup {
    fn absent_text(&self) -> String {
        format!("No course {} offered in {}.", self.course_ref, self.term)
    }
}

impl CourseArgs {
    async fn lookup(self, catalog: &CatalogService) -> Result<Lookup, ToolError> {
        let course_ref: CourseRef = self.course_id.parse()?;
        let term = Term::parse(&self.term, Some(catalog.default_year()))?;
        let course = catalog.course(&course_ref, term).await?;
        Ok(Lookup {
            course_ref,
            term,
            course,
        })
    }
}

/// Handler for `search_courses`
#[derive(Debug)]
pub struct SearchCoursesHandler {
    pub catalog: Arc<CatalogService>,
}

#[async_trait::async_trait]
impl ToolHandler for SearchCoursesHandler {
    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let params: QueryParams = decode(args)?;
        let query = Query::from_params(&params, Some(self.catalog.default_year()))?;

        let courses = absent_on_not_found(self.catalog.search(&query).await.map(Some))?;
        let summaries: Vec<CourseSummary> = courses
            .iter()
            .flat_map(|c| c.iter())
            .map(CourseRecord::summary)
            .collect();
        tracing::info!(%query, results = summaries.len(), "search_courses");

        Ok(ToolOutput {
            text: format::search_results(&summaries),
            structured: json!({ "courses": to_value(&summaries)? }),
        })
    }
}

/// Handler for `get_course`
#[derive(Debug)]
pub struct GetCourseHandler {
    pub catalog: Arc<CatalogService>,
}

#[async_trait::async_trait]
impl ToolHandler for GetCourseHandler {
    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let lookup = decode::<CourseArgs>(args)?.lookup(&self.catalog).await?;

        Ok(match &lookup.course {
            Some(course) => ToolOutput {
                text: format::course_detail(course),
                structured: json!({ "course": to_value(course)? }),
            },
            None => ToolOutput {
                text: lookup.absent_text(),
                structured: json!({ "course": null }),
            },
        })
    }
}

/// Handler for `get_schedule`
#[derive(Debug)]
pub struct GetScheduleHandler {
    pub catalog: Arc<CatalogService>,
}

#[async_trait::async_trait]
impl ToolHandler for GetScheduleHandler {
    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let lookup = decode::<CourseArgs>(args)?.lookup(&self.catalog).await?;

        Ok(match &lookup.course {
            Some(course) => ToolOutput {
                text: format::schedule(course, &course.sections),
                structured: json!({
                    "course_id": &course.course_id,
                    "code": course.code(),
                    "term": &course.term,
                    "sections": to_value(&course.sections)?,
                }),
            },
            None => ToolOutput {
                text: lookup.absent_text(),
                structured: json!({
                    "course_id": lookup.course_ref.to_string(),
                    "code": null,
                    "term": lookup.term.to_string(),
                    "sections": [],
                }),
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct DepartmentArgs {
    term: String,
    #[serde(default)]
    school: Option<String>,
}

/// Handler for `list_departments`
#[derive(Debug)]
pub struct ListDepartmentsHandler {
    pub catalog: Arc<CatalogService>,
}

#[async_trait::async_trait]
impl ToolHandler for ListDepartmentsHandler {
    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let args: DepartmentArgs = decode(args)?;
        let year = academic_year(Some(&args.term), self.catalog.default_year())?;

        let departments =
            absent_on_not_found(self.catalog.departments(year, args.school.as_deref()).await)?;

        let text = match (departments.is_empty(), args.school.as_deref()) {
            (true, Some(school)) => format!("No departments found for school '{}'.", school),
            (true, None) => "No departments found.".to_string(),
            (false, _) => format::departments(&departments),
        };

        Ok(ToolOutput {
            text,
            structured: json!({ "departments": to_value(&departments)? }),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SchoolArgs {
    #[serde(default)]
    term: Option<String>,
    #[serde(default)]
    include_department_count: bool,
}

/// Handler for `list_schools`
#[derive(Debug)]
pub struct ListSchoolsHandler {
    pub catalog: Arc<CatalogService>,
}

#[async_trait::async_trait]
impl ToolHandler for ListSchoolsHandler {
    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let args: SchoolArgs = decode(args)?;
        let year = academic_year(args.term.as_deref(), self.catalog.default_year())?;

        let schools = absent_on_not_found(self.catalog.schools(year).await.map(Some))?;
        let summaries: Vec<_> = schools
            .iter()
            .flat_map(|s| s.iter())
            .map(|s| s.summary(args.include_department_count))
            .collect();

        Ok(ToolOutput {
            text: format::schools(&summaries),
            structured: json!({ "schools": to_value(&summaries)? }),
        })
    }
}
