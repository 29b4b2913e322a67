//! Mock source for testing purposes.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::sources::{CatalogSource, SourceError, UpstreamRequest};

/// A mock catalog that returns predefined payloads.
///
/// Scripted outcomes (see [`MockSource::push_outcome`]) are consumed first, one
/// per call; after that the configured course or school payload is returned.
#[derive(Debug, Default)]
pub struct MockSource {
    courses_payload: Mutex<Option<String>>,
    schools_payload: Mutex<Option<String>>,
    scripted: Mutex<VecDeque<Result<String, SourceError>>>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<UpstreamRequest>>,
    calls: AtomicUsize,
}

impl MockSource {
    /// Create a new mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that answers course searches with `courses`.
    pub fn with_courses(courses: &[CourseFixture]) -> Self {
        let source = Self::new();
        source.set_courses_payload(courses_xml(courses));
        source
    }

    /// Set the raw payload returned for course searches.
    pub fn set_courses_payload(&self, payload: impl Into<String>) {
        *self.courses_payload.lock().unwrap() = Some(payload.into());
    }

    /// Set the raw payload returned for school listings.
    pub fn set_schools_payload(&self, payload: impl Into<String>) {
        *self.schools_payload.lock().unwrap() = Some(payload.into());
    }

    /// Queue a one-shot outcome for the next call.
    pub fn push_outcome(&self, outcome: Result<String, SourceError>) {
        self.scripted.lock().unwrap().push_back(outcome);
    }

    /// Queue a one-shot failure for the next call.
    pub fn push_failure(&self, error: SourceError) {
        self.push_outcome(Err(error));
    }

    /// Delay every call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Number of `raw_query` invocations so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogSource for MockSource {
    fn id(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    async fn raw_query(&self, request: &UpstreamRequest) -> Result<String, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.scripted.lock().unwrap().pop_front();
        if let Some(outcome) = scripted {
            return outcome;
        }

        let payload = match request {
            UpstreamRequest::Courses { .. } => self.courses_payload.lock().unwrap().clone(),
            UpstreamRequest::Schools { .. } => self.schools_payload.lock().unwrap().clone(),
        };
        Ok(payload.unwrap_or_else(|| match request {
            UpstreamRequest::Courses { .. } => courses_xml(&[]),
            UpstreamRequest::Schools { .. } => schools_xml(&[]),
        }))
    }
}

/// A course to render into a mock XML payload
#[derive(Debug, Clone)]
pub struct CourseFixture {
    pub course_id: String,
    pub subject: String,
    pub code: String,
    pub title: String,
    pub description: String,
    pub term: String,
    pub instructors: Vec<String>,
}

/// Helper function to create a course fixture with a single lecture section.
pub fn make_course(course_id: &str, subject: &str, code: &str, title: &str) -> CourseFixture {
    CourseFixture {
        course_id: course_id.to_string(),
        subject: subject.to_string(),
        code: code.to_string(),
        title: title.to_string(),
        description: format!("{} {}: {}", subject, code, title),
        term: "2024-2025 Autumn".to_string(),
        instructors: vec!["Doe, J.".to_string()],
    }
}

fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// Render fixtures as an ExploreCourses search payload.
pub fn courses_xml(courses: &[CourseFixture]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><xml><courses>");
    for course in courses {
        let instructors: String = course
            .instructors
            .iter()
            .map(|name| format!("<instructor><name>{}</name><role>PI</role></instructor>", escape(name)))
            .collect();
        xml.push_str(&format!(
            "<course>\
               <year>{year}</year><subject>{subject}</subject><code>{code}</code>\
               <title>{title}</title><description>{description}</description>\
               <gers>WAY-FR</gers><repeatable>false</repeatable>\
               <grading>Letter or Credit/No Credit</grading>\
               <unitsMin>3</unitsMin><unitsMax>5</unitsMax>\
               <sections><section>\
                 <classId>{id}1</classId><term>{term}</term><units>3-5</units>\
                 <sectionNumber>01</sectionNumber><component>LEC</component>\
                 <currentClassSize>120</currentClassSize><maxClassSize>300</maxClassSize>\
                 <currentWaitlistSize>0</currentWaitlistSize><maxWaitlistSize>50</maxWaitlistSize>\
                 <notes/>\
                 <schedules><schedule>\
                   <startDate>Sep 23, 2024</startDate><endDate>Dec 6, 2024</endDate>\
                   <startTime>10:30:00 AM</startTime><endTime>11:20:00 AM</endTime>\
                   <location>NVIDIA Auditorium</location>\
                   <days>Monday Wednesday Friday</days>\
                   <instructors>{instructors}</instructors>\
                 </schedule></schedules>\
               </section></sections>\
               <administrativeInformation>\
                 <courseId>{id}</courseId><academicCareer>UG</academicCareer>\
                 <finalExamFlag>Y</finalExamFlag>\
               </administrativeInformation>\
             </course>",
            year = escape(course.term.split_whitespace().next().unwrap_or_default()),
            subject = escape(&course.subject),
            code = escape(&course.code),
            title = escape(&course.title),
            description = escape(&course.description),
            id = escape(&course.course_id),
            term = escape(&course.term),
            instructors = instructors,
        ));
    }
    xml.push_str("</courses></xml>");
    xml
}

/// Render `(school, [(code, name)])` pairs as an ExploreCourses school listing.
pub fn schools_xml(schools: &[(&str, &[(&str, &str)])]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><schools>");
    for (school, departments) in schools {
        xml.push_str(&format!("<school name=\"{}\">", escape(school)));
        for (code, name) in departments.iter() {
            xml.push_str(&format!(
                "<department name=\"{}\" longname=\"{}\"/>",
                escape(code),
                escape(name)
            ));
        }
        xml.push_str("</school>");
    }
    xml.push_str("</schools>");
    xml
}
