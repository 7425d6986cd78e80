//! Domain models: generation mode, target roles, capsules, quiz questions,
//! evaluation results, and the course/topic catalog entries.

use serde::{Deserialize, Serialize};

/// Which generation instructions apply to a capsule request.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
  /// A concept useful for the selected roles.
  Career,
  /// A refresher on a specific course/topic the user has already seen.
  Course,
  /// Something relevant to both the roles and course material.
  Mix,
}
impl Default for Mode {
  fn default() -> Self { Mode::Career }
}

impl Mode {
  pub fn as_str(&self) -> &'static str {
    match self {
      Mode::Career => "career",
      Mode::Course => "course",
      Mode::Mix => "mix",
    }
  }
}

/// Target roles a capsule can be tailored to. Serialized as display labels.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
  #[serde(rename = "Product Manager")]
  ProductManager,
  #[serde(rename = "Supply Chain")]
  SupplyChain,
  #[serde(rename = "TPM")]
  Tpm,
  #[serde(rename = "Analytics")]
  Analytics,
}

impl Role {
  pub const ALL: [Role; 4] = [Role::ProductManager, Role::SupplyChain, Role::Tpm, Role::Analytics];

  pub fn label(&self) -> &'static str {
    match self {
      Role::ProductManager => "Product Manager",
      Role::SupplyChain => "Supply Chain",
      Role::Tpm => "TPM",
      Role::Analytics => "Analytics",
    }
  }
}

/// Which backend produced a capsule.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CapsuleSource {
  Primary,
  Fallback,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizQuestion {
  pub question: String,
  pub expected_answer: String,
}

/// One generated study unit. Always carries exactly two questions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Capsule {
  pub id: String,
  pub concept: String,
  pub questions: Vec<QuizQuestion>,
  pub source: CapsuleSource,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationResult {
  pub question: String,
  pub expected_answer: String,
  pub user_answer: String,
  pub is_correct: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum CourseType {
  #[serde(rename = "University course")]
  University,
  #[serde(rename = "Coursera / online")]
  Online,
  #[serde(rename = "Other")]
  Other,
}
impl Default for CourseType {
  fn default() -> Self { CourseType::University }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum CourseStatus {
  #[serde(rename = "Currently taking")]
  Taking,
  #[serde(rename = "Completed")]
  Completed,
  #[serde(rename = "Planning to take")]
  Planned,
}
impl Default for CourseStatus {
  fn default() -> Self { CourseStatus::Taking }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Topic {
  pub id: u32,
  pub name: String,
  #[serde(default)] pub notes: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Course {
  pub id: u32,
  pub name: String,
  pub ctype: CourseType,
  pub status: CourseStatus,
  #[serde(default)] pub topics: Vec<Topic>,
}

impl Course {
  /// Prompt label for one of this course's topics, e.g. "Operations Management — Little's Law".
  pub fn topic_label(&self, topic: &Topic) -> String {
    format!("{} — {}", self.name, topic.name)
  }
}
