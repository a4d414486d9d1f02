//! The pubsub subsystem.

use crate::dispatch::Dispatcher;
use crate::errors::{ClientError, DecodeError, FailureCode};
use crate::pb;
use crate::request::{PubsubRequest, Request};
use crate::stream_handle::StreamHandle;
use crate::types::{decode_peer_ids, PubsubMessage, ResultStream};
use futures::stream::{self, StreamExt};
use libp2p::PeerId;
use log::*;
use prost::Message;

pub struct Pubsub<'a> {
    dispatcher: &'a Dispatcher,
}

impl<'a> Pubsub<'a> {
    pub(crate) fn new(dispatcher: &'a Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// The topics the daemon is currently subscribed to.
    pub async fn get_topics(&self) -> Result<Vec<String>, ClientError> {
        let request = Request::Pubsub(PubsubRequest::GetTopics);
        let response = self.dispatcher.call(request, FailureCode::PubsubGetTopicsFailed).await?;
        Ok(response.pubsub.map(|ps| ps.topics).unwrap_or_default())
    }

    /// The peers we are exchanging messages with on `topic`. An empty topic lists the peers of every topic.
    pub async fn list_peers(&self, topic: &str) -> Result<Vec<PeerId>, ClientError> {
        let request = Request::Pubsub(PubsubRequest::ListPeers { topic: topic.to_string() });
        let response = self.dispatcher.call(request, FailureCode::PubsubListPeersFailed).await?;
        let ids = response.pubsub.map(|ps| ps.peer_ids).unwrap_or_default();
        Ok(decode_peer_ids(&ids)?)
    }

    pub async fn publish(&self, topic: &str, data: &[u8]) -> Result<(), ClientError> {
        check_topic(topic)?;
        let request = Request::Pubsub(PubsubRequest::Publish { topic: topic.to_string(), data: data.to_vec() });
        self.dispatcher
            .check_request_size(&request)
            .map_err(|err| ClientError::InvalidData(format!("{} byte message is too large. {err}", data.len())))?;
        self.dispatcher.call(request, FailureCode::PubsubPublishFailed).await?;
        Ok(())
    }

    /// Subscribe to `topic` and stream the messages published on it.
    ///
    /// The subscription lasts as long as the returned stream: it never ends on its own unless the daemon closes the
    /// connection, and dropping it unsubscribes.
    pub async fn subscribe(&self, topic: &str) -> Result<ResultStream<PubsubMessage>, ClientError> {
        check_topic(topic)?;
        let request = Request::Pubsub(PubsubRequest::Subscribe { topic: topic.to_string() });
        let (_, handle) = self.dispatcher.open(request, FailureCode::PubsubSubscribeFailed).await?;
        info!("Subscribed to {topic}");
        Ok(messages(handle))
    }
}

fn check_topic(topic: &str) -> Result<(), ClientError> {
    if topic.is_empty() {
        return Err(ClientError::InvalidTopic("topic must not be empty".into()));
    }
    Ok(())
}

pub(crate) fn messages(handle: StreamHandle) -> ResultStream<PubsubMessage> {
    stream::try_unfold(handle, |mut handle| async move {
        match next_message(&mut handle).await {
            Ok(Some(msg)) => Ok(Some((msg, handle))),
            Ok(None) => {
                debug!("Daemon closed the subscription");
                handle.close().await;
                Ok(None)
            }
            Err(err) => {
                handle.close().await;
                Err(err)
            }
        }
    })
    .boxed()
}

async fn next_message(handle: &mut StreamHandle) -> Result<Option<PubsubMessage>, ClientError> {
    let Some(frame) = handle.read().await? else {
        return Ok(None);
    };
    let msg = pb::PsMessage::decode(frame.as_slice()).map_err(DecodeError::from)?;
    Ok(Some(PubsubMessage::try_from(msg)?))
}
