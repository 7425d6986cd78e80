//! In-memory course/topic catalog. Lost on restart.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::{Course, CourseStatus, CourseType, Topic};
use crate::error::CatalogError;

#[derive(Debug, Default)]
pub struct Catalog {
  courses: Vec<Course>,
}

impl Catalog {
  pub fn add_course(&mut self, name: &str, ctype: CourseType, status: CourseStatus) -> Result<Course, CatalogError> {
    let name = name.trim();
    if name.is_empty() {
      return Err(CatalogError::EmptyName("course"));
    }
    let course = Course {
      id: self.courses.len() as u32 + 1,
      name: name.to_string(),
      ctype,
      status,
      topics: vec![],
    };
    self.courses.push(course.clone());
    Ok(course)
  }

  pub fn add_topic(&mut self, course_id: u32, name: &str, notes: &str) -> Result<Topic, CatalogError> {
    let name = name.trim();
    if name.is_empty() {
      return Err(CatalogError::EmptyName("topic"));
    }
    let course = self
      .courses
      .iter_mut()
      .find(|c| c.id == course_id)
      .ok_or(CatalogError::UnknownCourse(course_id))?;
    let topic = Topic {
      id: course.topics.len() as u32 + 1,
      name: name.to_string(),
      notes: notes.trim().to_string(),
    };
    course.topics.push(topic.clone());
    Ok(topic)
  }

  pub fn list(&self) -> &[Course] { &self.courses }

  /// Uniform pick over every (course, topic) pair, as a prompt label.
  pub fn pick_random_topic<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
    let pairs: Vec<(&Course, &Topic)> = self
      .courses
      .iter()
      .flat_map(|c| c.topics.iter().map(move |t| (c, t)))
      .collect();
    pairs.choose(rng).map(|(c, t)| c.topic_label(t))
  }
}
