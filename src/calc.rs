use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AssessmentType, Score, Student, Subject, Weight, WeightSet};
use crate::store::{Filter, RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum CalcError {
    #[error("{kind} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("invalid grading configuration: {0}")]
    InvalidConfiguration(String),
    #[error("record store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl CalcError {
    pub fn code(&self) -> &'static str {
        match self {
            CalcError::NotFound { .. } => "not_found",
            CalcError::InvalidConfiguration(_) => "invalid_configuration",
            CalcError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    /// HTTP-equivalent status for callers that front this over HTTP.
    pub fn status(&self) -> u16 {
        match self {
            CalcError::NotFound { .. } => 404,
            CalcError::InvalidConfiguration(_) => 400,
            CalcError::StoreUnavailable(_) => 503,
        }
    }
}

/// Rounds to 2 decimals against the exact binary value of `x`; exact ties go
/// to the even hundredth, so 60.125 becomes 60.12.
pub fn round_2_decimals(x: f64) -> f64 {
    if !x.is_finite() || x.abs() >= 1e15 {
        return x;
    }
    // 60 fractional digits print every float in the score range exactly.
    let exact = format!("{:.60}", x.abs());
    let Some((int_part, frac)) = exact.split_once('.') else {
        return x;
    };
    let (Ok(whole), Ok(kept)) = (int_part.parse::<u64>(), frac[..2].parse::<u64>()) else {
        return x;
    };
    let mut hundredths = whole * 100 + kept;
    let rest = &frac.as_bytes()[2..];
    let round_up = match rest.first() {
        Some(b'5') => rest[1..].iter().any(|d| *d != b'0') || hundredths % 2 == 1,
        Some(d) => *d > b'5',
        None => false,
    };
    if round_up {
        hundredths += 1;
    }
    (hundredths as f64 / 100.0).copysign(x)
}

fn check_total(weights: &WeightSet) -> Result<f64, CalcError> {
    let total = weights.total();
    if total <= 0.0 {
        return Err(CalcError::InvalidConfiguration(
            "all assessment weights are 0".to_string(),
        ));
    }
    Ok(total)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentAverage {
    pub average: Option<f64>,
    pub count: usize,
}

impl ComponentAverage {
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut sum = 0.0_f64;
        let mut count: usize = 0;
        for v in values {
            sum += v;
            count += 1;
        }
        ComponentAverage {
            average: if count > 0 {
                Some(sum / (count as f64))
            } else {
                None
            },
            count,
        }
    }
}

/// Unweighted mean of every score of one assessment type for a student in a
/// subject, regardless of date.
pub fn aggregate_scores<S: RecordStore>(
    store: &S,
    student_id: &str,
    subject_id: &str,
    kind: AssessmentType,
) -> Result<ComponentAverage, StoreError> {
    let filter = Filter::new()
        .eq("student_id", student_id.to_string())
        .eq("subject_id", subject_id.to_string())
        .eq("type", kind);
    let scores = store.find::<Score>(&filter, usize::MAX)?;
    Ok(ComponentAverage::from_values(
        scores.iter().map(|s| s.data.value),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    /// Configured for the student's class.
    Class,
    /// Configured for the subject without a class.
    Subject,
    /// Nothing configured; builtin 30/20/20/30.
    Builtin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWeights {
    pub weights: WeightSet,
    pub source: WeightSource,
    pub weight_id: Option<String>,
}

/// Exact class match, then the subject-wide weight, then builtin defaults.
pub fn resolve_weights<S: RecordStore>(
    store: &S,
    subject_id: &str,
    class_name: &str,
) -> Result<ResolvedWeights, StoreError> {
    let levels = [
        (class_name.trim(), WeightSource::Class),
        ("", WeightSource::Subject),
    ];
    for (scope, source) in levels {
        if source == WeightSource::Class && scope.is_empty() {
            continue;
        }
        let filter = Filter::new()
            .eq("subject_id", subject_id.to_string())
            .eq("class_scope", scope.to_string());
        if let Some(w) = store.find_one::<Weight>(&filter)? {
            return Ok(ResolvedWeights {
                weights: w.data.weights(),
                source,
                weight_id: Some(w.id),
            });
        }
    }

    tracing::warn!(
        subject_id,
        class_name,
        "no weights configured, using builtin defaults"
    );
    Ok(ResolvedWeights {
        weights: WeightSet::BUILTIN,
        source: WeightSource::Builtin,
        weight_id: None,
    })
}

/// How components without any score enter the final grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Missing work counts as zero; its weight stays in the total.
    #[default]
    ZeroFill,
    /// Missing components are dropped and the present ones are scaled up to
    /// carry the full configured weight.
    Renormalize,
}

impl MissingPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "zero_fill" | "zero-fill" | "zerofill" => Some(MissingPolicy::ZeroFill),
            "renormalize" | "exclude" => Some(MissingPolicy::Renormalize),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MissingPolicy::ZeroFill => "zero_fill",
            MissingPolicy::Renormalize => "renormalize",
        }
    }

    fn effective_weights(
        self,
        weights: &WeightSet,
        averages: &[(AssessmentType, ComponentAverage)],
    ) -> Vec<f64> {
        match self {
            MissingPolicy::ZeroFill => averages.iter().map(|(t, _)| weights.get(*t)).collect(),
            MissingPolicy::Renormalize => {
                let present: f64 = averages
                    .iter()
                    .filter(|(_, a)| a.average.is_some())
                    .map(|(t, _)| weights.get(*t))
                    .sum();
                let scale = if present > 0.0 {
                    weights.total() / present
                } else {
                    0.0
                };
                averages
                    .iter()
                    .map(|(t, a)| match a.average {
                        Some(_) => weights.get(*t) * scale,
                        None => 0.0,
                    })
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    #[serde(rename = "Tuntas")]
    Passed,
    #[serde(rename = "Belum Tuntas")]
    NotPassed,
}

impl Verdict {
    /// Reaching the threshold exactly passes.
    pub fn judge(final_score: f64, kkm: f64) -> Self {
        if final_score >= kkm {
            Verdict::Passed
        } else {
            Verdict::NotPassed
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Verdict::Passed => "Tuntas",
            Verdict::NotPassed => "Belum Tuntas",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScore {
    #[serde(rename = "type")]
    pub kind: AssessmentType,
    pub average: Option<f64>,
    pub count: usize,
    pub weight: f64,
    pub effective_weight: f64,
    pub weighted_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedGrade {
    pub components: Vec<ComponentScore>,
    pub total_weight: f64,
    /// Weighted sum before rounding; the verdict is judged on this.
    pub raw_score: f64,
    pub final_score: f64,
}

/// Combines per-type averages with weights. The final score is rounded to 2
/// decimals; component averages are left as computed.
pub fn combine(
    weights: &WeightSet,
    averages: &[(AssessmentType, ComponentAverage)],
    policy: MissingPolicy,
) -> Result<WeightedGrade, CalcError> {
    let total_weight = check_total(weights)?;

    let effective = policy.effective_weights(weights, averages);
    let mut components = Vec::with_capacity(averages.len());
    let mut sum = 0.0_f64;
    for ((kind, avg), eff) in averages.iter().zip(effective) {
        let weighted_score = avg.average.unwrap_or(0.0) * (eff / 100.0);
        sum += weighted_score;
        components.push(ComponentScore {
            kind: *kind,
            average: avg.average,
            count: avg.count,
            weight: weights.get(*kind),
            effective_weight: eff,
            weighted_score,
        });
    }

    Ok(WeightedGrade {
        components,
        total_weight,
        raw_score: sum,
        final_score: round_2_decimals(sum),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub id: String,
    pub full_name: String,
    pub student_number: String,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub id: String,
    pub name: String,
    pub kkm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReport {
    pub student: StudentSummary,
    pub subject: SubjectSummary,
    pub weights: WeightSet,
    pub weight_source: WeightSource,
    pub weight_id: Option<String>,
    pub policy: MissingPolicy,
    pub total_weight: f64,
    pub components: Vec<ComponentScore>,
    pub final_score: f64,
    pub status: Verdict,
}

/// Final grade of one student in one subject. Reads only; every call sees
/// the current scores and weights.
pub fn generate_report<S: RecordStore>(
    store: &S,
    student_id: &str,
    subject_id: &str,
    policy: MissingPolicy,
) -> Result<GradeReport, CalcError> {
    let student = store
        .get_by_id::<Student>(student_id)?
        .ok_or_else(|| CalcError::NotFound {
            kind: "student",
            id: student_id.to_string(),
        })?;
    let subject = store
        .get_by_id::<Subject>(subject_id)?
        .ok_or_else(|| CalcError::NotFound {
            kind: "subject",
            id: subject_id.to_string(),
        })?;

    let resolved = resolve_weights(store, &subject.id, &student.data.class_name)?;
    // Checked before touching scores so a bad configuration computes nothing.
    check_total(&resolved.weights)?;

    let mut averages = Vec::with_capacity(AssessmentType::ALL.len());
    for kind in AssessmentType::ALL {
        averages.push((
            kind,
            aggregate_scores(store, &student.id, &subject.id, kind)?,
        ));
    }

    let grade = combine(&resolved.weights, &averages, policy)?;
    let status = Verdict::judge(grade.raw_score, subject.data.kkm);
    tracing::debug!(
        student_id = %student.id,
        subject_id = %subject.id,
        raw_score = grade.raw_score,
        final_score = grade.final_score,
        status = status.label(),
        "report computed"
    );

    Ok(GradeReport {
        student: StudentSummary {
            id: student.id,
            full_name: student.data.full_name,
            student_number: student.data.student_number,
            class_name: student.data.class_name,
        },
        subject: SubjectSummary {
            id: subject.id,
            name: subject.data.name,
            kkm: subject.data.kkm,
        },
        weights: resolved.weights,
        weight_source: resolved.source,
        weight_id: resolved.weight_id,
        policy,
        total_weight: grade.total_weight,
        components: grade.components,
        final_score: grade.final_score,
        status,
    })
}
