//! Tool registry for MCP tools.

use std::collections::HashMap;
use std::sync::Arc;

use rmcp::model::{JsonObject, Tool, ToolAnnotations};
use serde_json::{json, Value};

use super::error::ToolError;
use super::handlers::{
    GetCourseHandler, GetScheduleHandler, ListDepartmentsHandler, ListSchoolsHandler,
    SearchCoursesHandler, ToolHandler, ToolOutput,
};
use super::schema;
use crate::catalog::CatalogService;
use crate::models::FilterGroup;

/// The closed set of tools this server offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    SearchCourses,
    GetCourse,
    GetSchedule,
    ListDepartments,
    ListSchools,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::SearchCourses,
        ToolKind::GetCourse,
        ToolKind::GetSchedule,
        ToolKind::ListDepartments,
        ToolKind::ListSchools,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::SearchCourses => "search_courses",
            ToolKind::GetCourse => "get_course",
            ToolKind::GetSchedule => "get_schedule",
            ToolKind::ListDepartments => "list_departments",
            ToolKind::ListSchools => "list_schools",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ToolKind::SearchCourses => "Search Stanford courses",
            ToolKind::GetCourse => "Course Details",
            ToolKind::GetSchedule => "Course Schedule",
            ToolKind::ListDepartments => "Departments in a School",
            ToolKind::ListSchools => "Schools at Stanford",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::SearchCourses => {
                "Search ExploreCourses for a term by department, course number and/or keyword, \
                 optionally filtered by requirements, units, times, days and career. Returns \
                 summaries in catalog order; use get_course for full details."
            }
            ToolKind::GetCourse => {
                "Fetch a full course record by course id (e.g. 105645) or code (e.g. CS106A), \
                 including GERs, grading, repeatability, exam flag and sections for the term."
            }
            ToolKind::GetSchedule => {
                "Fetch the sections of a course for a term: instructors, meeting days, times, \
                 locations and enrollment."
            }
            ToolKind::ListDepartments => {
                "List departments (name and code) within a school. If school is omitted or \
                 'all', returns departments across all schools."
            }
            ToolKind::ListSchools => {
                "Return all schools available in ExploreCourses, optionally with department counts."
            }
        }
    }

    pub fn input_schema(&self) -> Value {
        let term = json!({
            "type": "string",
            "minLength": 1,
            "description": "Term such as '2024-2025 Autumn', or just 'Autumn' for the default academic year"
        });
        let course_id = json!({
            "type": "string",
            "minLength": 1,
            "description": "ExploreCourses course id (e.g. '105645') or course code (e.g. 'CS106A', 'CS 106A')"
        });

        match self {
            ToolKind::SearchCourses => {
                let mut properties = json!({
                    "term": term,
                    "department": {"type": "string", "minLength": 1, "description": "Subject code, e.g. 'CS'"},
                    "number": {"type": "string", "minLength": 1, "description": "Course number, e.g. '106A'"},
                    "keyword": {"type": "string", "minLength": 1, "description": "Free-text search"}
                });
                for group in FilterGroup::ALL {
                    let values: Vec<&str> = group.values().collect();
                    properties[group.key()] = json!({
                        "type": "array",
                        "items": {"type": "string", "minLength": 1},
                        "description": format!("Optional filters (case-insensitive): {}", values.join(", "))
                    });
                }
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": ["term"],
                    "additionalProperties": false
                })
            }
            ToolKind::GetCourse | ToolKind::GetSchedule => json!({
                "type": "object",
                "properties": {"course_id": course_id, "term": term},
                "required": ["course_id", "term"],
                "additionalProperties": false
            }),
            ToolKind::ListDepartments => json!({
                "type": "object",
                "properties": {
                    "term": term,
                    "school": {
                        "type": "string",
                        "description": "School name as returned by list_schools, e.g. 'School of Engineering'"
                    }
                },
                "required": ["term"],
                "additionalProperties": false
            }),
            ToolKind::ListSchools => json!({
                "type": "object",
                "properties": {
                    "term": term,
                    "include_department_count": {
                        "type": "boolean",
                        "description": "Include the number of departments per school"
                    }
                },
                "additionalProperties": false
            }),
        }
    }

    pub fn output_schema(&self) -> Value {
        match self {
            ToolKind::SearchCourses => json!({
                "type": "object",
                "properties": {"courses": {"type": "array", "items": course_summary_schema()}},
                "required": ["courses"]
            }),
            // `course` is null when nothing matches in the term
            ToolKind::GetCourse => {
                let mut course = course_record_schema();
                course["type"] = json!(["object", "null"]);
                json!({
                    "type": "object",
                    "properties": {"course": course},
                    "required": ["course"]
                })
            }
            ToolKind::GetSchedule => json!({
                "type": "object",
                "properties": {
                    "course_id": {"type": "string"},
                    "code": nullable_string(),
                    "term": {"type": "string"},
                    "sections": {"type": "array", "items": section_schema()}
                },
                "required": ["course_id", "code", "term", "sections"]
            }),
            ToolKind::ListDepartments => json!({
                "type": "object",
                "properties": {
                    "departments": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "code": {"type": "string"},
                                "name": {"type": "string"},
                                "school": {"type": "string"}
                            },
                            "required": ["code", "name", "school"]
                        }
                    }
                },
                "required": ["departments"]
            }),
            ToolKind::ListSchools => json!({
                "type": "object",
                "properties": {
                    "schools": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "department_count": {"type": "integer", "minimum": 0}
                            },
                            "required": ["name"]
                        }
                    }
                },
                "required": ["schools"]
            }),
        }
    }

    fn handler(&self, catalog: Arc<CatalogService>) -> Arc<dyn ToolHandler> {
        match self {
            ToolKind::SearchCourses => Arc::new(SearchCoursesHandler { catalog }),
            ToolKind::GetCourse => Arc::new(GetCourseHandler { catalog }),
            ToolKind::GetSchedule => Arc::new(GetScheduleHandler { catalog }),
            ToolKind::ListDepartments => Arc::new(ListDepartmentsHandler { catalog }),
            ToolKind::ListSchools => Arc::new(ListSchoolsHandler { catalog }),
        }
    }
}

fn nullable_string() -> Value {
    json!({"type": ["string", "null"]})
}

fn count() -> Value {
    json!({"type": "integer", "minimum": 0})
}

fn course_summary_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "course_id": {"type": "string"},
            "code": {"type": "string"},
            "department": {"type": "string"},
            "number": {"type": "string"},
            "title": {"type": "string"},
            "description": {"type": "string"},
            "units_min": count(),
            "units_max": count()
        },
        "required": ["course_id", "code", "department", "number", "title", "description", "units_min", "units_max"]
    })
}

fn section_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "section_id": {"type": "string"},
            "component": {"type": "string"},
            "section_number": {"type": "string"},
            "term": {"type": "string"},
            "units": {"type": "string"},
            "instructors": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "sunet": nullable_string(),
                        "role": nullable_string()
                    },
                    "required": ["name"]
                }
            },
            "schedule": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "days": {"type": "array", "items": {"type": "string"}},
                        "start_time": nullable_string(),
                        "end_time": nullable_string(),
                        "start_date": nullable_string(),
                        "end_date": nullable_string(),
                        "location": nullable_string()
                    },
                    "required": ["days"]
                }
            },
            "enrollment_cap": count(),
            "enrollment_current": count(),
            "waitlist_cap": count(),
            "waitlist_current": count(),
            "notes": nullable_string()
        },
        "required": ["section_id", "instructors", "schedule", "enrollment_cap", "enrollment_current"]
    })
}

fn course_record_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "course_id": {"type": "string"},
            "department": {"type": "string"},
            "number": {"type": "string"},
            "title": {"type": "string"},
            "description": {"type": "string"},
            "units_min": count(),
            "units_max": count(),
            "term": {"type": "string"},
            "gers": {"type": "array", "items": {"type": "string"}},
            "grading_basis": nullable_string(),
            "repeatable": {"type": "boolean"},
            "academic_career": nullable_string(),
            "final_exam": {"type": "boolean"},
            "sections": {"type": "array", "items": section_schema()}
        },
        "required": ["course_id", "department", "number", "title", "description", "units_min", "units_max", "term", "sections"]
    })
}

fn schema_object(schema: &Value) -> JsonObject {
    schema.as_object().cloned().unwrap_or_default()
}

/// A registered tool: its contract and its handler
#[derive(Clone)]
pub struct ToolDescriptor {
    pub kind: ToolKind,
    pub input_schema: Value,
    pub output_schema: Value,
    handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.kind.name())
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// The `tools/list` entry for this tool
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: self.kind.name().into(),
            title: Some(self.kind.title().to_string()),
            description: Some(self.kind.description().into()),
            input_schema: Arc::new(schema_object(&self.input_schema)),
            output_schema: Some(Arc::new(schema_object(&self.output_schema))),
            annotations: Some(ToolAnnotations {
                title: None,
                read_only_hint: Some(true),
                destructive_hint: Some(false),
                idempotent_hint: Some(true),
                open_world_hint: Some(true),
            }),
            icons: None,
            meta: None,
        }
    }
}

/// Registry for all MCP tools, fixed at construction
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    /// Create the registry with every [`ToolKind`] bound to `catalog`
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        let tools: Vec<ToolDescriptor> = ToolKind::ALL
            .iter()
            .map(|kind| ToolDescriptor {
                kind: *kind,
                input_schema: kind.input_schema(),
                output_schema: kind.output_schema(),
                handler: kind.handler(Arc::clone(&catalog)),
            })
            .collect();
        let by_name = tools
            .iter()
            .enumerate()
            .map(|(i, tool)| (tool.name(), i))
            .collect();

        Self { tools, by_name }
    }

    /// Get all tools, in declaration order
    pub fn all(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    /// Validate the arguments, run the handler and check its output
    pub async fn invoke(&self, name: &str, args: Option<Value>) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let args = args.unwrap_or_else(|| json!({}));
        schema::validate(&tool.input_schema, &args)?;

        let output = tool.handler.execute(args).await?;

        if let Err(e) = schema::validate(&tool.output_schema, &output.structured) {
            tracing::error!(tool = name, error = %e, "Tool output does not match its schema");
            return Err(ToolError::Internal(format!("output schema violation: {}", e)));
        }

        Ok(output)
    }
}
