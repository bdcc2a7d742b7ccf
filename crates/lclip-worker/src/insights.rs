//! On-demand derived artifacts: lecture summaries and quizzes.
//!
//! Generated from the stored transcript after a job completes; cached in
//! the artifact store so repeated requests don't re-bill the model.

use std::sync::Arc;

use tracing::info;

use lclip_ml_client::GeminiClient;
use lclip_models::{JobId, Quiz, QuizQuestion, Summary, TopicSummary, TranscriptSegment};
use lclip_store::ArtifactStore;

use crate::credentials::CredentialVault;
use crate::error::{WorkerError, WorkerResult};

/// Questions per generated quiz.
const QUIZ_QUESTION_COUNT: u32 = 8;

/// Generate (or return the cached) summary for a job.
pub async fn summary_for_job(
    store: &Arc<dyn ArtifactStore>,
    ml: &Arc<GeminiClient>,
    vault: &CredentialVault,
    job_id: &JobId,
) -> WorkerResult<Summary> {
    if let Some(cached) = store.summary(job_id).await? {
        return Ok(cached);
    }

    let job = store.get_job(job_id).await?;
    let transcript = transcript_text(store, job_id).await?;
    let api_key = vault.load_key(&job.principal_id).await?;

    let response = ml.generate_summary(&transcript, api_key.expose()).await?;
    let summary = Summary {
        overview: response.overview,
        key_points: response.key_points,
        topic_summaries: response
            .topic_summaries
            .into_iter()
            .map(|t| TopicSummary {
                topic: t.topic,
                summary: t.summary,
            })
            .collect(),
    };

    store.put_summary(job_id, &summary).await?;
    info!(job_id = %job_id, "Summary generated");
    Ok(summary)
}

/// Generate (or return the cached) quiz for a job.
pub async fn quiz_for_job(
    store: &Arc<dyn ArtifactStore>,
    ml: &Arc<GeminiClient>,
    vault: &CredentialVault,
    job_id: &JobId,
) -> WorkerResult<Quiz> {
    if let Some(cached) = store.quiz(job_id).await? {
        return Ok(cached);
    }

    let job = store.get_job(job_id).await?;
    let transcript = transcript_text(store, job_id).await?;
    let api_key = vault.load_key(&job.principal_id).await?;

    let response = ml
        .generate_quiz(&transcript, QUIZ_QUESTION_COUNT, api_key.expose())
        .await?;

    // Drop malformed questions instead of failing the request
    let questions: Vec<QuizQuestion> = response
        .questions
        .into_iter()
        .filter(|q| q.options.len() == 4 && (q.answer_index as usize) < q.options.len())
        .map(|q| QuizQuestion {
            question: q.question,
            options: q.options,
            answer_index: q.answer_index,
            explanation: q.explanation,
        })
        .collect();

    if questions.is_empty() {
        return Err(WorkerError::internal(
            "quiz generation returned no usable questions",
        ));
    }

    let quiz = Quiz { questions };
    store.put_quiz(job_id, &quiz).await?;
    info!(job_id = %job_id, "Quiz generated");
    Ok(quiz)
}

async fn transcript_text(
    store: &Arc<dyn ArtifactStore>,
    job_id: &JobId,
) -> WorkerResult<String> {
    let transcripts = store.transcript_segments(job_id).await?;
    if transcripts.is_empty() {
        return Err(WorkerError::conflict(
            "job has no transcript; process the video first",
        ));
    }
    Ok(render_transcript(&transcripts))
}

fn render_transcript(transcripts: &[TranscriptSegment]) -> String {
    transcripts
        .iter()
        .map(|t| format!("[{:.1}s - {:.1}s]: \"{}\"", t.start, t.end, t.text))
        .collect::<Vec<_>>()
        .join("\n")
}
