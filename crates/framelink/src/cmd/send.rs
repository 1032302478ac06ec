use std::fs;
use std::time::Duration;

use framelink_frame::{decode_message, encode, Message};
use framelink_transport::{MessageSink, MessageSocket, MessageSource, RawMessage, WsSocket};
use tracing::debug;

use crate::cmd::{runtime, SendArgs};
use crate::config::parse_duration;
use crate::exit::{
    frame_error, io_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;
    runtime()?.block_on(send(&args, &payload, wait_timeout, format))
}

async fn send(
    args: &SendArgs,
    payload: &[u8],
    wait_timeout: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    let frame = encode(args.protocol_id, payload).map_err(|err| frame_error("encode failed", err))?;
    let socket = WsSocket::connect(&args.url)
        .await
        .map_err(|err| transport_error("connect failed", err))?;
    let (mut sink, mut source) = socket.split();

    sink.send(RawMessage::binary(frame))
        .await
        .map_err(|err| transport_error("send failed", err))?;
    debug!(
        url = %args.url,
        protocol_id = args.protocol_id,
        len = payload.len(),
        "frame sent"
    );

    if args.wait {
        let message = wait_for_response(&mut source, wait_timeout).await?;
        print_message(&message, &args.url, format);
    }

    if let Err(err) = sink.close().await {
        debug!(error = %err, "close failed");
    }
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

/// Read one frame from `source`, giving up after `timeout`.
async fn wait_for_response<R: MessageSource>(
    source: &mut R,
    timeout: Duration,
) -> CliResult<Message> {
    let received = tokio::time::timeout(timeout, source.recv())
        .await
        .map_err(|_| CliError::new(TIMEOUT, format!("no response within {timeout:?}")))?
        .map_err(|err| transport_error("receive failed", err))?;

    match received {
        Some(raw) => decode_message(raw).map_err(|err| frame_error("invalid response", err)),
        None => Err(CliError::new(
            FAILURE,
            "connection closed before a response arrived",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framelink_transport::pair;

    fn args(json: Option<&str>, data: Option<&str>) -> SendArgs {
        SendArgs {
            url: "ws://127.0.0.1:1".to_string(),
            protocol_id: 1,
            json: json.map(str::to_string),
            data: data.map(str::to_string),
            file: None,
            wait: false,
            wait_timeout: "5s".to_string(),
        }
    }

    #[test]
    fn payload_from_data_or_json() {
        assert_eq!(resolve_payload(&args(None, Some("hello"))).unwrap(), b"hello");
        assert_eq!(
            resolve_payload(&args(Some(r#"{"x":1}"#), None)).unwrap(),
            br#"{"x":1}"#
        );
        assert!(resolve_payload(&args(None, None)).unwrap().is_empty());
    }

    #[test]
    fn invalid_json_is_a_usage_error() {
        let err = resolve_payload(&args(Some("{nope"), None)).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[tokio::test]
    async fn wait_for_response_decodes_frame() {
        let (local, remote) = pair(4);
        let (_local_sink, mut local_source) = local.split();
        let (mut remote_sink, _remote_source) = remote.split();

        remote_sink
            .send(RawMessage::binary(encode(9, b"pong").unwrap()))
            .await
            .unwrap();

        let message = wait_for_response(&mut local_source, Duration::from_secs(1))
            .await
            .expect("response");
        assert_eq!(message.protocol_id(), 9);
        assert_eq!(&message.payload()[..], b"pong");
    }

    #[tokio::test]
    async fn wait_for_response_reports_close() {
        let (local, remote) = pair(4);
        let (_local_sink, mut local_source) = local.split();
        drop(remote);

        let err = wait_for_response(&mut local_source, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.code, FAILURE);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_response_times_out() {
        let (local, _remote) = pair(4);
        let (_local_sink, mut local_source) = local.split();

        let err = wait_for_response(&mut local_source, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.code, TIMEOUT);
    }

    #[tokio::test]
    async fn wait_for_response_rejects_malformed_frame() {
        let (local, remote) = pair(4);
        let (_local_sink, mut local_source) = local.split();
        let (mut remote_sink, _remote_source) = remote.split();

        remote_sink
            .send(RawMessage::binary(vec![1, 2, 3]))
            .await
            .unwrap();

        let err = wait_for_response(&mut local_source, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::exit::DATA_INVALID);
    }
}
