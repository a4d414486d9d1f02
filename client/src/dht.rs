//! The DHT subsystem.
//!
//! Lookups that can produce many results (`find_providers`, `get_closest_peers`, `find_peers_connected_to_peer`,
//! `search_value`) are streamed: after the OK envelope the daemon sends one VALUE frame per result and finishes
//! with an END frame. The returned [`ResultStream`] yields the results as they arrive.

use crate::dispatch::Dispatcher;
use crate::errors::{ClientError, DecodeError, FailureCode};
use crate::pb;
use crate::pb::dht_response::Type as DhtResponseType;
use crate::request::{DhtRequest, Request};
use crate::stream_handle::StreamHandle;
use crate::types::{PeerInfo, ResultStream};
use cid::Cid;
use futures::stream::{self, StreamExt};
use libp2p::identity::PublicKey;
use libp2p::PeerId;
use log::*;
use prost::Message;

/// The number of providers requested by [`Dht::find_providers`] when the caller does not say.
pub const DEFAULT_PROVIDER_COUNT: u32 = 1;

type ValueDecoder<T> = fn(pb::DhtResponse) -> Result<T, ClientError>;

pub struct Dht<'a> {
    dispatcher: &'a Dispatcher,
}

impl<'a> Dht<'a> {
    pub(crate) fn new(dispatcher: &'a Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Store `value` under `key`.
    pub async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), ClientError> {
        self.check_key(key)?;
        let request = Request::Dht(DhtRequest::PutValue { key: key.to_vec(), value: value.to_vec() });
        self.dispatcher
            .check_request_size(&request)
            .map_err(|err| ClientError::InvalidValue(format!("{} byte value is too large. {err}", value.len())))?;
        self.dispatcher.call(request, FailureCode::DhtPutFailed).await?;
        Ok(())
    }

    /// Fetch the best value stored under `key`.
    pub async fn get(&self, key: &[u8]) -> Result<Vec<u8>, ClientError> {
        self.check_key(key)?;
        let request = Request::Dht(DhtRequest::GetValue { key: key.to_vec() });
        let response = self.dispatcher.call(request, FailureCode::DhtGetFailed).await?;
        dht_payload(response)?.value.ok_or(ClientError::Decode(DecodeError::MissingField("dht.value")))
    }

    /// Look up the addresses of `peer`.
    pub async fn find_peer(&self, peer: &PeerId) -> Result<PeerInfo, ClientError> {
        let request = Request::Dht(DhtRequest::FindPeer { peer: *peer });
        let response = self.dispatcher.call(request, FailureCode::DhtFindPeerFailed).await?;
        let info = dht_payload(response)?.peer.ok_or(DecodeError::MissingField("dht.peer"))?;
        Ok(PeerInfo::try_from(info)?)
    }

    /// Announce that this node can provide `cid`.
    pub async fn provide(&self, cid: &Cid) -> Result<(), ClientError> {
        let request = Request::Dht(DhtRequest::Provide { cid: *cid });
        self.dispatcher.call(request, FailureCode::DhtProvideFailed).await?;
        Ok(())
    }

    pub async fn get_public_key(&self, peer: &PeerId) -> Result<PublicKey, ClientError> {
        let request = Request::Dht(DhtRequest::GetPublicKey { peer: *peer });
        let response = self.dispatcher.call(request, FailureCode::DhtGetPublicKeyFailed).await?;
        let bytes = dht_payload(response)?.value.ok_or(DecodeError::MissingField("dht.value"))?;
        let key = PublicKey::try_decode_protobuf(&bytes).map_err(DecodeError::from)?;
        Ok(key)
    }

    /// Stream the peers that provide `cid`. `count` is passed to the daemon as a hint and defaults to
    /// [`DEFAULT_PROVIDER_COUNT`]; the stream yields whatever the daemon sends.
    pub async fn find_providers(&self, cid: &Cid, count: Option<u32>) -> Result<ResultStream<PeerInfo>, ClientError> {
        let count = count.unwrap_or(DEFAULT_PROVIDER_COUNT);
        let request = Request::Dht(DhtRequest::FindProviders { cid: *cid, count });
        self.open_values(request, FailureCode::DhtFindProvidersFailed, peer_record).await
    }

    /// Stream the peers closest to `key` in the DHT keyspace.
    pub async fn get_closest_peers(&self, key: &[u8]) -> Result<ResultStream<PeerInfo>, ClientError> {
        self.check_key(key)?;
        let request = Request::Dht(DhtRequest::GetClosestPeers { key: key.to_vec() });
        self.open_values(request, FailureCode::DhtGetClosestPeersFailed, closest_peer).await
    }

    pub async fn find_peers_connected_to_peer(&self, peer: &PeerId) -> Result<ResultStream<PeerInfo>, ClientError> {
        let request = Request::Dht(DhtRequest::FindPeersConnectedToPeer { peer: *peer });
        self.open_values(request, FailureCode::DhtFindPeersConnectedToPeerFailed, peer_record).await
    }

    /// Stream every value found for `key`, in the order the daemon discovers them.
    pub async fn search_value(&self, key: &[u8]) -> Result<ResultStream<Vec<u8>>, ClientError> {
        self.check_key(key)?;
        let request = Request::Dht(DhtRequest::SearchValue { key: key.to_vec() });
        self.open_values(request, FailureCode::DhtSearchValueFailed, value_bytes).await
    }

    fn check_key(&self, key: &[u8]) -> Result<(), ClientError> {
        if key.is_empty() {
            return Err(ClientError::InvalidKey("DHT keys must not be empty".into()));
        }
        if key.len() > self.dispatcher.max_frame_size() {
            return Err(ClientError::InvalidKey(format!("{} byte key is too large", key.len())));
        }
        Ok(())
    }

    async fn open_values<T: Send + 'static>(
        &self,
        request: Request,
        failure: FailureCode,
        decode: ValueDecoder<T>,
    ) -> Result<ResultStream<T>, ClientError> {
        let (_, handle) = self.dispatcher.open(request, failure).await?;
        Ok(dht_values(handle, decode))
    }
}

fn dht_payload(response: pb::Response) -> Result<pb::DhtResponse, ClientError> {
    response.dht.ok_or(ClientError::Decode(DecodeError::MissingField("dht")))
}

/// Turn the frames that follow an OK envelope into a stream of decoded VALUE payloads.
///
/// END finishes the stream without reading further. A connection closed by the daemon also finishes it. Any other
/// frame is a protocol violation that ends the stream with an error. The handle is closed whenever the stream
/// finishes.
pub(crate) fn dht_values<T: Send + 'static>(handle: StreamHandle, decode: ValueDecoder<T>) -> ResultStream<T> {
    stream::try_unfold(handle, move |mut handle| async move {
        match next_value(&mut handle, decode).await {
            Ok(Some(value)) => Ok(Some((value, handle))),
            Ok(None) => {
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

async fn next_value<T>(handle: &mut StreamHandle, decode: ValueDecoder<T>) -> Result<Option<T>, ClientError> {
    let Some(frame) = handle.read().await? else {
        debug!("Daemon closed the DHT stream without an END frame");
        return Ok(None);
    };
    let response = pb::DhtResponse::decode(frame.as_slice())?;
    match DhtResponseType::try_from(response.r#type) {
        Ok(DhtResponseType::Value) => decode(response).map(Some),
        Ok(DhtResponseType::End) => {
            trace!("DHT stream finished");
            Ok(None)
        }
        Ok(DhtResponseType::Begin) => Err(ClientError::UnexpectedMessage("DHT BEGIN after the envelope".into())),
        Err(_) => Err(ClientError::UnexpectedMessage(format!("DHT response of type {}", response.r#type))),
    }
}

fn peer_record(response: pb::DhtResponse) -> Result<PeerInfo, ClientError> {
    let info = response.peer.ok_or_else(|| ClientError::UnexpectedMessage("DHT VALUE without a peer".into()))?;
    Ok(PeerInfo::try_from(info)?)
}

/// Closest-peer results carry either a full peer record or just the peer id bytes in `value`.
fn closest_peer(response: pb::DhtResponse) -> Result<PeerInfo, ClientError> {
    match (response.peer, response.value) {
        (Some(info), _) => Ok(PeerInfo::try_from(info)?),
        (None, Some(bytes)) => {
            let id = PeerId::from_bytes(&bytes).map_err(DecodeError::from)?;
            Ok(PeerInfo::new(id, Vec::new()))
        }
        (None, None) => Err(ClientError::UnexpectedMessage("DHT VALUE without a peer".into())),
    }
}

fn value_bytes(response: pb::DhtResponse) -> Result<Vec<u8>, ClientError> {
    response.value.ok_or_else(|| ClientError::UnexpectedMessage("DHT VALUE without a value".into()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::{encode_frame, DEFAULT_MAX_FRAME_SIZE};
    use futures::TryStreamExt;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    async fn stream_over(frames: Vec<pb::DhtResponse>) -> (StreamHandle, DuplexStream) {
        let (local, mut remote) = duplex(64 * 1024);
        for frame in frames {
            remote.write_all(&encode_frame(&frame.encode_to_vec())).await.unwrap();
        }
        (StreamHandle::new(Box::new(local), DEFAULT_MAX_FRAME_SIZE), remote)
    }

    #[tokio::test]
    async fn end_stops_before_trailing_frames() {
        let frames = vec![
            pb::DhtResponse::with_value(b"a".to_vec()),
            pb::DhtResponse::with_value(b"b".to_vec()),
            pb::DhtResponse::end(),
            pb::DhtResponse::with_value(b"never read".to_vec()),
        ];
        let (handle, mut remote) = stream_over(frames).await;
        let values: Vec<Vec<u8>> = dht_values(handle, value_bytes).try_collect().await.unwrap();
        assert_eq!(values, vec![b"a".to_vec(), b"b".to_vec()]);
        // The client side was shut down once END arrived.
        let mut rest = Vec::new();
        assert_eq!(remote.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn closed_connection_ends_the_stream() {
        let (handle, remote) = stream_over(vec![pb::DhtResponse::with_value(b"only".to_vec())]).await;
        drop(remote);
        let values: Vec<Vec<u8>> = dht_values(handle, value_bytes).try_collect().await.unwrap();
        assert_eq!(values, vec![b"only".to_vec()]);
    }

    #[tokio::test]
    async fn unknown_frame_type_is_unexpected() {
        let bogus = pb::DhtResponse { r#type: 42, ..Default::default() };
        let (handle, _remote) = stream_over(vec![pb::DhtResponse::with_value(b"a".to_vec()), bogus]).await;
        let mut values = dht_values(handle, value_bytes);
        assert_eq!(values.next().await.unwrap().unwrap(), b"a");
        let err = values.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedMessage(_)));
        assert!(values.next().await.is_none());
    }

    #[tokio::test]
    async fn begin_after_envelope_is_unexpected() {
        let (handle, _remote) = stream_over(vec![pb::DhtResponse::begin()]).await;
        let err = dht_values(handle, value_bytes).try_collect::<Vec<_>>().await.unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedMessage(_)));
    }

    #[tokio::test]
    async fn closest_peers_accept_bare_ids_and_records() {
        let bare = PeerId::random();
        let full = PeerInfo::new(PeerId::random(), vec!["/ip4/10.1.1.1/tcp/4001".parse().unwrap()]);
        let frames = vec![
            pb::DhtResponse::with_value(bare.to_bytes()),
            pb::DhtResponse::with_peer(pb::PeerInfo::from(&full)),
            pb::DhtResponse::end(),
        ];
        let (handle, _remote) = stream_over(frames).await;
        let peers: Vec<PeerInfo> = dht_values(handle, closest_peer).try_collect().await.unwrap();
        assert_eq!(peers, vec![PeerInfo::new(bare, vec![]), full]);
    }

    #[tokio::test]
    async fn value_without_peer_is_unexpected() {
        let (handle, _remote) = stream_over(vec![pb::DhtResponse::with_value(b"x".to_vec())]).await;
        let err = dht_values(handle, peer_record).try_collect::<Vec<_>>().await.unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedMessage(_)));
    }
}
