use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use super::types::ContainerAnalysis;

/// A label/confidence pair from an external classification capability.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierScore {
    pub label: String,
    pub confidence: f32,
}

/// Best-effort external scoring capability.
///
/// `None` means the capability is unavailable right now; that is not an
/// error, and every call site substitutes the local geometric analysis
/// instead. Implementations get a single attempt per call site; retrying
/// is the implementation's own business, inside the caller's deadline.
pub trait Classifier: Send + Sync {
    fn score(&self, descriptor: &str) -> Option<ClassifierScore>;
}

/// Compact text descriptor of an analysis, handed to the classifier.
pub fn build_descriptor(analysis: &ContainerAnalysis) -> String {
    format!(
        "meshes={} vertices={} materials={} height={:.2} width={:.2} skeleton={} animations={}",
        analysis.mesh_summaries.len(),
        analysis.vertex_count,
        analysis.material_count,
        analysis.bounding_box.height(),
        analysis.bounding_box.width(),
        analysis.has_existing_skeleton,
        analysis.has_animations,
    )
}

/// Run a single classifier attempt under a hard deadline.
///
/// The classifier runs on its own thread; if it does not answer in time
/// the pipeline moves on immediately and the late answer is discarded
/// when the worker eventually finishes.
pub fn score_with_deadline(
    classifier: &Arc<dyn Classifier>,
    descriptor: &str,
    deadline: Duration,
) -> Option<ClassifierScore> {
    let (sender, receiver) = mpsc::channel();
    let worker = Arc::clone(classifier);
    let descriptor = descriptor.to_owned();

    thread::spawn(move || {
        let _ = sender.send(worker.score(&descriptor));
    });

    match receiver.recv_timeout(deadline) {
        Ok(result) => {
            if result.is_none() {
                tracing::debug!("classifier reported unavailable, keeping geometric analysis");
            }
            result
        }
        Err(_) => {
            tracing::debug!(
                deadline_ms = deadline.as_millis() as u64,
                "classifier missed its deadline, keeping geometric analysis"
            );
            None
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::analyzer;
    use super::*;

    struct FixedClassifier {
        score: ClassifierScore,
    }

    impl Classifier for FixedClassifier {
        fn score(&self, _descriptor: &str) -> Option<ClassifierScore> {
            Some(self.score.clone())
        }
    }

    struct StalledClassifier {
        delay: Duration,
    }

    impl Classifier for StalledClassifier {
        fn score(&self, _descriptor: &str) -> Option<ClassifierScore> {
            thread::sleep(self.delay);
            Some(ClassifierScore {
                label: "humanoid".to_string(),
                confidence: 1.0,
            })
        }
    }

    #[test]
    fn given_prompt_classifier_when_scoring_then_result_is_returned() {
        let classifier: Arc<dyn Classifier> = Arc::new(FixedClassifier {
            score: ClassifierScore {
                label: "humanoid".to_string(),
                confidence: 0.9,
            },
        });

        let result = score_with_deadline(&classifier, "meshes=2", Duration::from_secs(1));
        assert_eq!(
            result,
            Some(ClassifierScore {
                label: "humanoid".to_string(),
                confidence: 0.9,
            })
        );
    }

    #[test]
    fn given_stalled_classifier_when_deadline_passes_then_none_is_returned() {
        let classifier: Arc<dyn Classifier> = Arc::new(StalledClassifier {
            delay: Duration::from_millis(250),
        });

        let result = score_with_deadline(&classifier, "meshes=2", Duration::from_millis(10));
        assert!(result.is_none());
    }

    #[test]
    fn given_degraded_analysis_when_building_descriptor_then_fields_are_present() {
        let descriptor = build_descriptor(&analyzer::degraded_analysis());
        assert!(descriptor.contains("vertices=0"));
        assert!(descriptor.contains("skeleton=false"));
    }
}
