//! Redis-backed artifact store.
//!
//! Layout:
//! - `job:{job_id}`: job row as a JSON string
//! - `jobs:running:{principal}`: set of running job ids per principal
//! - `art:{job_id}:{kind}`: ordered collections as lists of JSON records
//!   (pre-sorted on write)
//! - `art:{job_id}:clips`: hash `clip_id -> JSON` so per-clip compilation
//!   updates don't clobber each other
//! - `one:{job_id}:{kind}`: singleton records (layout, summary, quiz)
//! - `credential:{principal}`: encrypted model API key
//!
//! `replace_*` writes are MULTI pipelines (DEL + RPUSH/HSET). The two
//! read-modify-write contracts (progress clamping, terminal coalescing) run
//! as Lua scripts so concurrent writers cannot interleave.

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tracing::debug;

use lclip_models::{
    Clip, ClipId, ContentSegment, Job, JobId, JobStatus, LayoutAnalysis, PrincipalId, Quiz,
    SilenceRegion, SlideContent, Stage, Summary, TranscriptSegment,
};

use crate::error::{StoreError, StoreResult};
use crate::store::{
    prepare_clips, prepare_content_segments, prepare_silence_regions,
    prepare_transcript_segments, ArtifactStore, ClipArtifacts, ProgressUpdate, StatusUpdate,
};

const JOB_KEY_PREFIX: &str = "job:";
const RUNNING_SET_PREFIX: &str = "jobs:running:";
const ARTIFACT_KEY_PREFIX: &str = "art:";
const SINGLETON_KEY_PREFIX: &str = "one:";
const CREDENTIAL_KEY_PREFIX: &str = "credential:";

const KIND_SILENCE: &str = "silence";
const KIND_TRANSCRIPT: &str = "transcript";
const KIND_SLIDES: &str = "slides";
const KIND_CONTENT: &str = "content";
const KIND_CLIPS: &str = "clips";
const KIND_LAYOUT: &str = "layout";
const KIND_SUMMARY: &str = "summary";
const KIND_QUIZ: &str = "quiz";

/// Clamp-and-store progress update. Returns `NF` or `OK:{effective}`.
const PROGRESS_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return 'NF' end
local job = cjson.decode(raw)
if job.status == 'completed' or job.status == 'failed' then
  return 'OK:' .. tostring(job.progress_percent)
end
local pct = tonumber(ARGV[2])
local current = tonumber(job.progress_percent) or 0
if pct > current then current = pct end
job.progress_percent = current
job.current_stage = ARGV[1]
job.progress_message = ARGV[3]
redis.call('SET', KEYS[1], cjson.encode(job))
return 'OK:' .. tostring(current)
"#;

/// Status transition with terminal coalescing.
/// Returns `NF`, `COALESCED:{prev}`, `ILLEGAL:{prev}` or `OK:{prev}`.
const STATUS_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return 'NF' end
local job = cjson.decode(raw)
local prev = job.status
local target = ARGV[1]
if prev == 'completed' or prev == 'failed' then
  return 'COALESCED:' .. prev
end
local ok = (prev == 'queued' and (target == 'running' or target == 'failed'))
  or (prev == 'running' and (target == 'completed' or target == 'failed'))
if not ok then return 'ILLEGAL:' .. prev end
job.status = target
if target == 'failed' and ARGV[2] ~= '' then job.error = ARGV[2] end
if target == 'completed' or target == 'failed' then
  job.completed_at = ARGV[3]
  if target == 'completed' then job.progress_percent = 100 end
  redis.call('SREM', KEYS[2], ARGV[4])
else
  redis.call('SADD', KEYS[2], ARGV[4])
end
redis.call('SET', KEYS[1], cjson.encode(job))
return 'OK:' .. prev
"#;

const DURATION_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return 'NF' end
local job = cjson.decode(raw)
job.video_duration = tonumber(ARGV[1])
redis.call('SET', KEYS[1], cjson.encode(job))
return 'OK'
"#;

/// Redis-backed `ArtifactStore`.
#[derive(Clone)]
pub struct RedisArtifactStore {
    client: redis::Client,
    progress_script: redis::Script,
    status_script: redis::Script,
    duration_script: redis::Script,
}

impl RedisArtifactStore {
    /// Create a store against the given Redis URL.
    pub fn new(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::transient(format!("invalid redis url: {}", e)))?;
        Ok(Self {
            client,
            progress_script: redis::Script::new(PROGRESS_SCRIPT),
            status_script: redis::Script::new(STATUS_SCRIPT),
            duration_script: redis::Script::new(DURATION_SCRIPT),
        })
    }

    /// Create from the `REDIS_URL` environment variable.
    pub fn from_env() -> StoreResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&url)
    }

    async fn conn(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn job_key(job_id: &JobId) -> String {
        format!("{}{}", JOB_KEY_PREFIX, job_id)
    }

    fn running_key(principal: &PrincipalId) -> String {
        format!("{}{}", RUNNING_SET_PREFIX, principal)
    }

    fn artifact_key(job_id: &JobId, kind: &str) -> String {
        format!("{}{}:{}", ARTIFACT_KEY_PREFIX, job_id, kind)
    }

    fn singleton_key(job_id: &JobId, kind: &str) -> String {
        format!("{}{}:{}", SINGLETON_KEY_PREFIX, job_id, kind)
    }

    fn credential_key(principal: &PrincipalId) -> String {
        format!("{}{}", CREDENTIAL_KEY_PREFIX, principal)
    }

    /// Atomically clear and rewrite a list-backed collection.
    async fn replace_list<T: serde::Serialize>(
        &self,
        job_id: &JobId,
        kind: &str,
        records: &[T],
    ) -> StoreResult<()> {
        self.ensure_job_exists(job_id).await?;
        let key = Self::artifact_key(job_id, kind);
        let payloads = records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        if !payloads.is_empty() {
            pipe.rpush(&key, &payloads).ignore();
        }
        pipe.exec_async(&mut conn).await?;

        debug!(job_id = %job_id, kind, count = records.len(), "Replaced artifact collection");
        Ok(())
    }

    async fn read_list<T: serde::de::DeserializeOwned>(
        &self,
        job_id: &JobId,
        kind: &str,
    ) -> StoreResult<Vec<T>> {
        self.ensure_job_exists(job_id).await?;
        let key = Self::artifact_key(job_id, kind);
        let mut conn = self.conn().await?;
        let payloads: Vec<String> = conn.lrange(&key, 0, -1).await?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(StoreError::from))
            .collect()
    }

    async fn put_singleton<T: serde::Serialize>(
        &self,
        job_id: &JobId,
        kind: &str,
        value: &T,
    ) -> StoreResult<()> {
        self.ensure_job_exists(job_id).await?;
        let key = Self::singleton_key(job_id, kind);
        let payload = serde_json::to_string(value)?;
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(&key, payload).await?;
        Ok(())
    }

    async fn read_singleton<T: serde::de::DeserializeOwned>(
        &self,
        job_id: &JobId,
        kind: &str,
    ) -> StoreResult<Option<T>> {
        self.ensure_job_exists(job_id).await?;
        let key = Self::singleton_key(job_id, kind);
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn.get(&key).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    async fn ensure_job_exists(&self, job_id: &JobId) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(Self::job_key(job_id)).await?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::not_found(format!("job {}", job_id)))
        }
    }

    fn parse_status(s: &str) -> StoreResult<JobStatus> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(StoreError::transient(format!(
                "unexpected status from backend: {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl ArtifactStore for RedisArtifactStore {
    async fn create_job(&self, job: &Job) -> StoreResult<()> {
        let key = Self::job_key(&job.job_id);
        let payload = serde_json::to_string(job)?;
        let mut conn = self.conn().await?;
        let created: bool = conn.set_nx(&key, payload).await?;
        if !created {
            return Err(StoreError::invariant(format!(
                "job {} already exists",
                job.job_id
            )));
        }
        debug!(job_id = %job.job_id, "Created job row");
        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> StoreResult<Job> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn.get(Self::job_key(job_id)).await?;
        let payload = payload.ok_or_else(|| StoreError::not_found(format!("job {}", job_id)))?;
        Ok(serde_json::from_str(&payload)?)
    }

    async fn delete_job(&self, job_id: &JobId) -> StoreResult<()> {
        let job = self.get_job(job_id).await?;
        let mut keys = vec![Self::job_key(job_id)];
        for kind in [
            KIND_SILENCE,
            KIND_TRANSCRIPT,
            KIND_SLIDES,
            KIND_CONTENT,
            KIND_CLIPS,
        ] {
            keys.push(Self::artifact_key(job_id, kind));
        }
        for kind in [KIND_LAYOUT, KIND_SUMMARY, KIND_QUIZ] {
            keys.push(Self::singleton_key(job_id, kind));
        }

        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .del(keys)
            .ignore()
            .srem(Self::running_key(&job.principal_id), job_id.as_str())
            .ignore()
            .exec_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        error: Option<String>,
    ) -> StoreResult<StatusUpdate> {
        let job = self.get_job(job_id).await?;
        let completed_at = serde_json::to_string(&Utc::now())?
            .trim_matches('"')
            .to_string();

        let mut conn = self.conn().await?;
        let reply: String = self
            .status_script
            .key(Self::job_key(job_id))
            .key(Self::running_key(&job.principal_id))
            .arg(status.as_str())
            .arg(error.unwrap_or_default())
            .arg(completed_at)
            .arg(job_id.as_str())
            .invoke_async(&mut conn)
            .await?;

        match reply.split_once(':') {
            Some(("OK", prev)) => Ok(StatusUpdate {
                previous: Self::parse_status(prev)?,
                current: status,
                changed: true,
            }),
            Some(("COALESCED", prev)) => {
                let previous = Self::parse_status(prev)?;
                Ok(StatusUpdate {
                    previous,
                    current: previous,
                    changed: false,
                })
            }
            Some(("ILLEGAL", prev)) => Err(StoreError::invariant(format!(
                "illegal status transition {} -> {}",
                prev, status
            ))),
            _ => Err(StoreError::not_found(format!("job {}", job_id))),
        }
    }

    async fn set_job_progress(
        &self,
        job_id: &JobId,
        stage: Stage,
        percent: f32,
        message: &str,
    ) -> StoreResult<ProgressUpdate> {
        // The stage string must round-trip through the job row's serde
        // representation, so pass the serialized enum value.
        let stage_name = serde_json::to_string(&stage)?;
        let stage_name = stage_name.trim_matches('"');

        let mut conn = self.conn().await?;
        let reply: String = self
            .progress_script
            .key(Self::job_key(job_id))
            .arg(stage_name)
            .arg(percent)
            .arg(message)
            .invoke_async(&mut conn)
            .await?;

        match reply.split_once(':') {
            Some(("OK", effective)) => Ok(ProgressUpdate {
                effective_percent: effective
                    .parse()
                    .map_err(|_| StoreError::transient("unparseable progress reply"))?,
            }),
            _ => Err(StoreError::not_found(format!("job {}", job_id))),
        }
    }

    async fn set_video_duration(&self, job_id: &JobId, seconds: f64) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let reply: String = self
            .duration_script
            .key(Self::job_key(job_id))
            .arg(seconds)
            .invoke_async(&mut conn)
            .await?;
        if reply == "OK" {
            Ok(())
        } else {
            Err(StoreError::not_found(format!("job {}", job_id)))
        }
    }

    async fn running_job_count(&self, principal: &PrincipalId) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.scard(Self::running_key(principal)).await?)
    }

    async fn replace_silence_regions(
        &self,
        job_id: &JobId,
        mut records: Vec<SilenceRegion>,
    ) -> StoreResult<()> {
        prepare_silence_regions(&mut records)?;
        self.replace_list(job_id, KIND_SILENCE, &records).await
    }

    async fn silence_regions(&self, job_id: &JobId) -> StoreResult<Vec<SilenceRegion>> {
        self.read_list(job_id, KIND_SILENCE).await
    }

    async fn replace_transcript_segments(
        &self,
        job_id: &JobId,
        mut records: Vec<TranscriptSegment>,
    ) -> StoreResult<()> {
        let duration = self.get_job(job_id).await?.video_duration;
        prepare_transcript_segments(&mut records, duration)?;
        self.replace_list(job_id, KIND_TRANSCRIPT, &records).await
    }

    async fn transcript_segments(&self, job_id: &JobId) -> StoreResult<Vec<TranscriptSegment>> {
        self.read_list(job_id, KIND_TRANSCRIPT).await
    }

    async fn put_layout(&self, job_id: &JobId, layout: &LayoutAnalysis) -> StoreResult<()> {
        self.put_singleton(job_id, KIND_LAYOUT, layout).await
    }

    async fn layout(&self, job_id: &JobId) -> StoreResult<Option<LayoutAnalysis>> {
        self.read_singleton(job_id, KIND_LAYOUT).await
    }

    async fn replace_slide_content(
        &self,
        job_id: &JobId,
        mut records: Vec<SlideContent>,
    ) -> StoreResult<()> {
        records.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        self.replace_list(job_id, KIND_SLIDES, &records).await
    }

    async fn slide_content(&self, job_id: &JobId) -> StoreResult<Vec<SlideContent>> {
        self.read_list(job_id, KIND_SLIDES).await
    }

    async fn replace_content_segments(
        &self,
        job_id: &JobId,
        mut records: Vec<ContentSegment>,
    ) -> StoreResult<()> {
        prepare_content_segments(&mut records)?;
        self.replace_list(job_id, KIND_CONTENT, &records).await
    }

    async fn content_segments(&self, job_id: &JobId) -> StoreResult<Vec<ContentSegment>> {
        self.read_list(job_id, KIND_CONTENT).await
    }

    async fn replace_clips(&self, job_id: &JobId, mut records: Vec<Clip>) -> StoreResult<()> {
        prepare_clips(&mut records);
        self.ensure_job_exists(job_id).await?;
        let key = Self::artifact_key(job_id, KIND_CLIPS);

        let mut entries = Vec::with_capacity(records.len());
        for clip in &records {
            entries.push((clip.clip_id.as_str().to_string(), serde_json::to_string(clip)?));
        }

        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        if !entries.is_empty() {
            pipe.hset_multiple(&key, &entries).ignore();
        }
        pipe.exec_async(&mut conn).await?;
        Ok(())
    }

    async fn clips(&self, job_id: &JobId) -> StoreResult<Vec<Clip>> {
        self.ensure_job_exists(job_id).await?;
        let key = Self::artifact_key(job_id, KIND_CLIPS);
        let mut conn = self.conn().await?;
        let payloads: Vec<String> = conn.hvals(&key).await?;
        let mut clips = payloads
            .iter()
            .map(|p| serde_json::from_str::<Clip>(p).map_err(StoreError::from))
            .collect::<StoreResult<Vec<_>>>()?;
        clips.sort_by_key(|c| c.order);
        Ok(clips)
    }

    async fn update_clip_artifacts(
        &self,
        job_id: &JobId,
        clip_id: &ClipId,
        artifacts: ClipArtifacts,
    ) -> StoreResult<()> {
        self.ensure_job_exists(job_id).await?;
        let key = Self::artifact_key(job_id, KIND_CLIPS);
        let mut conn = self.conn().await?;

        // One writer per clip: the compile scheduler never processes the
        // same clip twice concurrently, so this read-modify-write is safe.
        let payload: Option<String> = conn.hget(&key, clip_id.as_str()).await?;
        let payload =
            payload.ok_or_else(|| StoreError::not_found(format!("clip {}", clip_id)))?;
        let mut clip: Clip = serde_json::from_str(&payload)?;
        clip.blob_key = Some(artifacts.blob_key);
        clip.thumbnail_key = Some(artifacts.thumbnail_key);
        clip.subtitle_key = artifacts.subtitle_key;
        clip.file_size = Some(artifacts.file_size);

        conn.hset::<_, _, _, ()>(&key, clip_id.as_str(), serde_json::to_string(&clip)?)
            .await?;
        Ok(())
    }

    async fn put_summary(&self, job_id: &JobId, summary: &Summary) -> StoreResult<()> {
        self.put_singleton(job_id, KIND_SUMMARY, summary).await
    }

    async fn summary(&self, job_id: &JobId) -> StoreResult<Option<Summary>> {
        self.read_singleton(job_id, KIND_SUMMARY).await
    }

    async fn put_quiz(&self, job_id: &JobId, quiz: &Quiz) -> StoreResult<()> {
        self.put_singleton(job_id, KIND_QUIZ, quiz).await
    }

    async fn quiz(&self, job_id: &JobId) -> StoreResult<Option<Quiz>> {
        self.read_singleton(job_id, KIND_QUIZ).await
    }

    async fn put_credential(&self, principal: &PrincipalId, ciphertext: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(Self::credential_key(principal), ciphertext)
            .await?;
        Ok(())
    }

    async fn get_credential(&self, principal: &PrincipalId) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.get(Self::credential_key(principal)).await?)
    }

    async fn delete_credential(&self, principal: &PrincipalId) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(Self::credential_key(principal)).await?;
        Ok(())
    }
}
