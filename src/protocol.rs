//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::capsule::QuotaStatus;
use crate::domain::{Capsule, CapsuleSource, Course, CourseStatus, CourseType, EvaluationResult, Mode, Role, Topic};
use crate::state::ReviewSession;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    NewCapsule {
        mode: Mode,
        roles: Vec<Role>,
        #[serde(default, rename = "courseTopic")]
        course_topic: Option<String>,
    },
    SubmitAnswers {
        #[serde(rename = "capsuleId")]
        capsule_id: String,
        answers: Vec<String>,
    },
    AddCourse {
        name: String,
        #[serde(default)]
        ctype: CourseType,
        #[serde(default)]
        status: CourseStatus,
    },
    AddTopic {
        #[serde(rename = "courseId")]
        course_id: u32,
        name: String,
        #[serde(default)]
        notes: String,
    },
    ListCourses,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Capsule {
        capsule: CapsuleOut,
    },
    Evaluation {
        evaluation: EvaluationOut,
    },
    Course {
        course: Course,
    },
    Topic {
        topic: Topic,
    },
    Courses {
        courses: Vec<Course>,
    },
    Error {
        error: String,
        message: String,
    },
}

/// Question as shown before answering: the reference answer stays hidden.
#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub question: String,
}

/// DTO used by both WS and HTTP for capsule delivery.
#[derive(Debug, Serialize)]
pub struct CapsuleOut {
    pub id: String,
    pub concept: String,
    pub questions: Vec<QuestionOut>,
    pub source: CapsuleSource,
    pub course_topic_used: Option<String>,
}

/// Convert a full `Capsule` (internal) to the public DTO.
pub fn to_out(c: &Capsule, course_topic_used: Option<String>) -> CapsuleOut {
    CapsuleOut {
        id: c.id.clone(),
        concept: c.concept.clone(),
        questions: c
            .questions
            .iter()
            .map(|q| QuestionOut { question: q.question.clone() })
            .collect(),
        source: c.source,
        course_topic_used,
    }
}

#[derive(Debug, Serialize)]
pub struct EvaluationOut {
    pub capsule_id: String,
    pub correct: usize,
    pub total: usize,
    pub results: Vec<EvaluationResult>,
}

impl EvaluationOut {
    pub fn new(capsule_id: &str, results: Vec<EvaluationResult>) -> Self {
        Self {
            capsule_id: capsule_id.to_string(),
            correct: results.iter().filter(|r| r.is_correct).count(),
            total: results.len(),
            results,
        }
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct CapsuleIn {
    pub mode: Mode,
    pub roles: Vec<Role>,
    #[serde(default, rename = "courseTopic")]
    pub course_topic: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionOut {
    pub capsule: Option<CapsuleOut>,
    pub results: Option<Vec<EvaluationResult>>,
}

impl From<ReviewSession> for SessionOut {
    fn from(s: ReviewSession) -> Self {
        Self {
            capsule: s.capsule.as_ref().map(|c| to_out(c, s.course_topic_used.clone())),
            results: s.results,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AnswersIn {
    #[serde(rename = "capsuleId")]
    pub capsule_id: String,
    pub answers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CourseIn {
    pub name: String,
    #[serde(default)]
    pub ctype: CourseType,
    #[serde(default)]
    pub status: CourseStatus,
}

#[derive(Debug, Deserialize)]
pub struct TopicIn {
    pub name: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Serialize)]
pub struct CoursesOut {
    pub courses: Vec<Course>,
}

#[derive(Serialize)]
pub struct RolesOut {
    pub roles: Vec<Role>,
}

pub type QuotaOut = QuotaStatus;

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub primary_model: String,
    pub fallback_model: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QuizQuestion;

    #[test]
    fn capsule_out_hides_reference_answers() {
        let c = Capsule {
            id: "c1".into(),
            concept: "Little's Law".into(),
            questions: vec![
                QuizQuestion { question: "Q1".into(), expected_answer: "secret one".into() },
                QuizQuestion { question: "Q2".into(), expected_answer: "secret two".into() },
            ],
            source: CapsuleSource::Fallback,
        };
        let json = serde_json::to_string(&to_out(&c, Some("Ops — Little's Law".into()))).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains(r#""source":"fallback""#));
        assert!(json.contains(r#""course_topic_used":"Ops — Little's Law""#));
    }

    #[test]
    fn ws_messages_are_tagged() {
        let msg: ClientWsMessage = serde_json::from_str(
            r#"{"type":"new_capsule","mode":"course","roles":["TPM"],"courseTopic":"Ops — Little's Law"}"#,
        )
        .unwrap();
        match msg {
            ClientWsMessage::NewCapsule { mode, roles, course_topic } => {
                assert_eq!(mode, Mode::Course);
                assert_eq!(roles, vec![Role::Tpm]);
                assert_eq!(course_topic.as_deref(), Some("Ops — Little's Law"));
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let out = serde_json::to_value(ServerWsMessage::Pong).unwrap();
        assert_eq!(out, serde_json::json!({"type": "pong"}));
    }

    #[test]
    fn course_in_defaults_type_and_status() {
        let c: CourseIn = serde_json::from_str(r#"{"name":"Ops"}"#).unwrap();
        assert_eq!(c.ctype, CourseType::University);
        assert_eq!(c.status, CourseStatus::Taking);
    }

    #[test]
    fn evaluation_out_counts_correct_answers() {
        let r = |ok| EvaluationResult {
            question: "q".into(),
            expected_answer: "a".into(),
            user_answer: "u".into(),
            is_correct: ok,
        };
        let e = EvaluationOut::new("c1", vec![r(true), r(false)]);
        assert_eq!((e.correct, e.total), (1, 2));
    }
}
