use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};

use crate::error::UpstreamError;

/// DNS response information extracted from a parsed message
#[derive(Debug)]
pub struct DnsResponse {
	pub rcode: ResponseCode,
	pub answer_count: usize,
}

/// Parse a query name, rejecting anything hickory cannot encode.
pub fn parse_name(domain: &str) -> Result<Name, UpstreamError> {
	let mut name = Name::from_ascii(domain)
		.map_err(|e| UpstreamError::InvalidName {
			name: domain.to_string(),
			reason: e.to_string(),
		})?;
	name.set_fqdn(true);
	Ok(name)
}

/// Build an A query with recursion desired for the given name.
///
/// Returns the serialized query bytes ready to hand to a transport.
pub fn build_query(name: &Name, txid: u16) -> Result<Vec<u8>, UpstreamError> {
	let mut message = Message::new();
	message.set_id(txid);
	message.set_recursion_desired(true);
	message.add_query(Query::query(name.clone(), RecordType::A));

	message.to_vec()
		.map_err(|e| UpstreamError::Malformed(format!("failed to serialize DNS query: {}", e)))
}

/// Parse a DNS response, validating the transaction ID and message type.
pub fn parse_response(bytes: &[u8], expected_txid: u16) -> Result<DnsResponse, UpstreamError> {
	let message = Message::from_vec(bytes)
		.map_err(|e| UpstreamError::Malformed(e.to_string()))?;

	if message.id() != expected_txid {
		return Err(UpstreamError::TxidMismatch {
			expected: expected_txid,
			actual: message.id(),
		});
	}

	// Verify this is a response, not a query
	if message.message_type() != MessageType::Response {
		return Err(UpstreamError::NotAResponse);
	}

	Ok(DnsResponse {
		rcode: message.response_code(),
		answer_count: message.answer_count() as usize,
	})
}

/// Turn a query into a NOERROR reply with the same ID and question.
///
/// Used by the loopback responders in transport tests.
#[cfg(test)]
pub fn reply_to(query: &[u8]) -> Vec<u8> {
	let mut message = Message::from_vec(query).unwrap();
	message.set_message_type(MessageType::Response);
	message.set_response_code(ResponseCode::NoError);
	message.to_vec().unwrap()
}
