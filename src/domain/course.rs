//! Golf-course reference data.
//!
//! Courses are maintained by an external collaborator; the core only reads
//! them to order the availability matrix and to reject slots for unknown
//! courses.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a golf course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(pub Uuid);

impl std::fmt::Display for CourseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for CourseId {
    fn from(uuid: Uuid) -> Self {
        CourseId(uuid)
    }
}

impl std::ops::Deref for CourseId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GolfCourse {
    pub id: CourseId,
    pub name: String,
    /// Region the course is listed under on the dashboard
    pub region_name: String,
    /// Operator-configured position within its region
    pub sequence: i32,
}

impl GolfCourse {
    pub fn new(name: impl Into<String>, region_name: impl Into<String>, sequence: i32) -> Self {
        Self {
            id: CourseId(Uuid::new_v4()),
            name: name.into(),
            region_name: region_name.into(),
            sequence,
        }
    }
}

/// Dashboard order: region name ascending, then sequence number.
pub fn sort_for_display(courses: &mut [GolfCourse]) {
    courses.sort_by(|a, b| {
        a.region_name
            .cmp(&b.region_name)
            .then(a.sequence.cmp(&b.sequence))
            .then_with(|| a.name.cmp(&b.name))
    });
}
