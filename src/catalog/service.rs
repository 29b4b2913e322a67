//! Cached catalog operations shared by all sessions.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use super::{CatalogClient, FetchError};
use crate::config::Config;
use crate::models::{
    AcademicYear, CacheKey, CourseRecord, CourseRef, DepartmentSummary, Query, QueryError, School,
    Term,
};
use crate::sources::CatalogSource;
use crate::utils::{CacheStats, ResponseCache};

/// The catalog adapter plus the process-wide response caches
#[derive(Debug)]
pub struct CatalogService {
    client: CatalogClient,
    courses: ResponseCache<CacheKey, Arc<Vec<CourseRecord>>, FetchError>,
    schools: ResponseCache<AcademicYear, Arc<Vec<School>>, FetchError>,
    default_year: AcademicYear,
}

impl CatalogService {
    pub fn new(
        client: CatalogClient,
        ttl: Duration,
        capacity: NonZeroUsize,
        default_year: AcademicYear,
    ) -> Self {
        Self {
            client,
            courses: ResponseCache::new("courses", ttl, capacity),
            schools: ResponseCache::new("schools", ttl, capacity),
            default_year,
        }
    }

    pub fn from_config(source: Arc<dyn CatalogSource>, config: &Config) -> Result<Self, QueryError> {
        Ok(Self::new(
            CatalogClient::from_config(source, config),
            config.cache.ttl(),
            config.cache.capacity(),
            config.catalog.academic_year()?,
        ))
    }

    /// Academic year used when a term names only a quarter
    pub fn default_year(&self) -> AcademicYear {
        self.default_year
    }

    /// Courses matching `query`, served from cache when fresh
    pub async fn search(&self, query: &Query) -> Result<Arc<Vec<CourseRecord>>, FetchError> {
        let client = self.client.clone();
        let owned = query.clone();
        self.courses
            .get_or_fetch(query.cache_key(), move || async move {
                client.fetch(&owned).await.map(Arc::new)
            })
            .await
    }

    /// One course offered in `term`, or `None` when the catalog has no match
    pub async fn course(
        &self,
        course: &CourseRef,
        term: Term,
    ) -> Result<Option<CourseRecord>, FetchError> {
        let query = course.to_query(term)?;
        let courses = match self.search(&query).await {
            Ok(courses) => courses,
            Err(FetchError::NotFound(detail)) => {
                tracing::debug!(%course, %term, %detail, "Upstream has no such course");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        Ok(courses.iter().find(|c| course.matches(c)).cloned())
    }

    /// Schools and their departments for an academic year
    pub async fn schools(&self, year: AcademicYear) -> Result<Arc<Vec<School>>, FetchError> {
        let client = self.client.clone();
        self.schools
            .get_or_fetch(year, move || async move {
                client.fetch_schools(year).await.map(Arc::new)
            })
            .await
    }

    /// Departments of one school (matched case-insensitively), or of all schools.
    /// An unknown school has no departments.
    pub async fn departments(
        &self,
        year: AcademicYear,
        school: Option<&str>,
    ) -> Result<Vec<DepartmentSummary>, FetchError> {
        let schools = self.schools(year).await?;
        let wanted = school
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"));

        match wanted {
            None => Ok(schools.iter().flat_map(School::department_summaries).collect()),
            Some(name) => match schools.iter().find(|s| s.name.eq_ignore_ascii_case(name)) {
                Some(school) => Ok(school.department_summaries().collect()),
                None => {
                    tracing::debug!(school = name, "Unknown school");
                    Ok(Vec::new())
                }
            },
        }
    }

    /// Drop expired cache entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        self.courses.purge_expired() + self.schools.purge_expired()
    }

    /// Statistics of the course and school caches
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.courses.stats(), self.schools.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RateLimiter;
    use crate::models::Quarter;
    use crate::sources::mock::{make_course, schools_xml, MockSource};
    use crate::sources::SourceError;
    use crate::utils::RetryPolicy;

    fn service(source: Arc<MockSource>) -> CatalogService {
        let client = CatalogClient::new(
            source,
            Arc::new(RateLimiter::new(1000.0, 100, Duration::from_secs(1))),
            RetryPolicy::none(),
            Duration::from_secs(5),
        );
        CatalogService::new(
            client,
            Duration::from_secs(600),
            NonZeroUsize::new(64).unwrap(),
            AcademicYear::new(2024),
        )
    }

    fn autumn() -> Term {
        Term::new(AcademicYear::new(2024), Quarter::Autumn)
    }

    #[tokio::test(start_paused = true)]
    async fn test_equivalent_queries_share_cache_entry() {
        let source = Arc::new(MockSource::with_courses(&[make_course(
            "1", "CS", "106A", "Programming Methodology",
        )]));
        let service = service(Arc::clone(&source));

        let a = Query::builder(autumn()).department("cs").build().unwrap();
        let b = Query::builder(autumn()).department(" CS ").build().unwrap();
        service.search(&a).await.unwrap();
        service.search(&b).await.unwrap();

        assert_eq!(source.call_count(), 1);
        assert_eq!(service.cache_stats().0.hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_course_by_id_and_code() {
        let source = Arc::new(MockSource::with_courses(&[
            make_course("105645", "CS", "106A", "Programming Methodology"),
            make_course("105646", "CS", "106B", "Programming Abstractions"),
        ]));
        let service = service(source);

        let by_id = service
            .course(&"105646".parse().unwrap(), autumn())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id.number, "106B");

        let by_code = service
            .course(&"cs106a".parse().unwrap(), autumn())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_code.course_id, "105645");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_course_is_absent() {
        let source = Arc::new(MockSource::new());
        let service = service(Arc::clone(&source));
        let missing = service
            .course(&"999999".parse().unwrap(), autumn())
            .await
            .unwrap();
        assert!(missing.is_none());

        // an upstream 404 means the same thing
        source.push_failure(SourceError::NotFound("/search".into()));
        let missing = service
            .course(&"CS999".parse().unwrap(), autumn())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_departments_by_school() {
        let source = Arc::new(MockSource::new());
        let eng: &[(&str, &str)] = &[("CS", "Computer Science"), ("EE", "Electrical Engineering")];
        let law: &[(&str, &str)] = &[("LAW", "Law")];
        source.set_schools_payload(schools_xml(&[("School of Engineering", eng), ("Law School", law)]));
        let service = service(Arc::clone(&source));
        let year = AcademicYear::new(2024);

        assert_eq!(service.departments(year, None).await.unwrap().len(), 3);
        let eng_depts = service
            .departments(year, Some("school of engineering"))
            .await
            .unwrap();
        assert_eq!(eng_depts.len(), 2);
        assert_eq!(eng_depts[0].school, "School of Engineering");

        let none = service.departments(year, Some("Hogwarts")).await.unwrap();
        assert!(none.is_empty());

        // one upstream call serves all three lookups
        assert_eq!(source.call_count(), 1);
    }
}
