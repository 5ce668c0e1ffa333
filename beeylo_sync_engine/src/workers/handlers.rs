use async_trait::async_trait;
use log::*;

use crate::{
    queue::{ClaimedJob, TrackingJob, WebhookJob},
    sync_api::{TrackingApi, TrackingOutcome, WebhookProcessor},
    traits::{JobBroker, NotificationDatabase, SyncDatabase, TrackingDatabase},
    workers::{JobError, JobHandler},
};

pub struct WebhookJobHandler<B> {
    processor: WebhookProcessor<B>,
}

impl<B> WebhookJobHandler<B> {
    pub fn new(processor: WebhookProcessor<B>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl<B> JobHandler<WebhookJob> for WebhookJobHandler<B>
where B: SyncDatabase + NotificationDatabase + JobBroker
{
    async fn handle(&self, job: &ClaimedJob<WebhookJob>) -> Result<(), JobError> {
        let webhook = &job.payload;
        let outcome = self.processor.process(webhook).await?;
        debug!(
            "👷️ Job {} ({} from {}) done. Order: {:?}, customer: {:?}, {} notifications, {} tracking jobs",
            job.id(),
            webhook.topic,
            webhook.shop_domain,
            outcome.order_id,
            outcome.customer_id,
            outcome.notifications,
            outcome.tracking_jobs
        );
        Ok(())
    }
}

pub struct TrackingJobHandler<B> {
    api: TrackingApi<B>,
}

impl<B> TrackingJobHandler<B> {
    pub fn new(api: TrackingApi<B>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl<B> JobHandler<TrackingJob> for TrackingJobHandler<B>
where B: SyncDatabase + TrackingDatabase + NotificationDatabase
{
    async fn handle(&self, job: &ClaimedJob<TrackingJob>) -> Result<(), JobError> {
        match self.api.process_tracking(&job.payload).await? {
            TrackingOutcome::Skipped(reason) => debug!("👷️ Tracking job {} skipped. {reason}", job.id()),
            TrackingOutcome::Updated { status, events, .. } => {
                debug!("👷️ Tracking job {} done. {} is {status} ({events} events)", job.id(), job.payload.tracking_number)
            },
        }
        Ok(())
    }
}
