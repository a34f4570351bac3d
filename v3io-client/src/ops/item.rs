//! Item operations: single and batch reads, writes and updates.

use std::collections::HashMap;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use v3io_core::{decode_framed_items, decode_item, encode_item, parse_mtime_header};
use v3io_core::{AttrValue, Item, Result, V3ioError};

use super::{
    function_headers, DataPlane, CONTENT_TYPE_CAPNP, TRANSACTION_VERIFIER_HEADER,
};
use crate::response::Response;
use crate::transport::HttpMethod;
use crate::types::{
    DataPlaneInput, GetItemInput, GetItemOutput, GetItemsInput, GetItemsOutput, Output,
    PutItemInput, PutItemOutput, PutItemsInput, PutItemsOutput, UpdateItemInput, UpdateItemOutput,
};

/// Default update mode when the caller does not override it.
const UPDATE_MODE_CREATE_OR_REPLACE: &str = "CreateOrReplaceAttributes";
/// Synthetic attribute carrying the item key on wildcard scans.
const NAME_ATTRIBUTE: &str = "__name";

#[derive(Deserialize)]
struct GetItemEnvelope {
    #[serde(rename = "Item", default)]
    item: Map<String, Value>,
}

#[derive(Deserialize)]
struct GetItemsJsonEnvelope {
    #[serde(rename = "Items", default)]
    items: Vec<Map<String, Value>>,
    #[serde(rename = "NextMarker", default)]
    next_marker: String,
    #[serde(rename = "LastItemIncluded", default)]
    last_item_included: String,
    #[serde(rename = "Scattered", default)]
    scattered: String,
}

impl DataPlane {
    /// Reads selected attributes of a single item.
    pub async fn get_item(&self, input: &GetItemInput) -> Result<Response> {
        let body = json!({ "AttributesToGet": input.attribute_names.join(",") });

        let mut response = self
            .send_request(
                &input.data_plane,
                HttpMethod::Put,
                &input.path,
                "",
                function_headers("GetItem"),
                Bytes::from(body.to_string()),
            )
            .await?;

        let envelope: GetItemEnvelope = serde_json::from_slice(response.body())
            .map_err(|e| V3ioError::Decode(format!("item envelope: {e}")))?;
        let item = decode_item(&envelope.item)?;

        response.set_output(Output::GetItem(GetItemOutput { item }));
        Ok(response)
    }

    /// Scans items under a path.
    ///
    /// Content negotiation is driven by `request_json_response`: by default
    /// the server answers with the framed binary envelope, decoded
    /// section by section; JSON decoding applies otherwise. Wildcard
    /// attribute names (`*`, `**`) add a synthetic `__name` attribute to
    /// each returned item.
    pub async fn get_items(&self, input: &GetItemsInput) -> Result<Response> {
        let mut body = Map::new();

        if !input.attribute_names.is_empty() {
            body.insert(
                "AttributesToGet".to_string(),
                json!(input.attribute_names.join(",")),
            );
        }
        if let Some(table_name) = &input.table_name {
            body.insert("TableName".to_string(), json!(table_name));
        }
        if let Some(filter) = &input.filter {
            body.insert("FilterExpression".to_string(), json!(filter));
        }
        if let Some(marker) = input.marker.as_deref().filter(|marker| !marker.is_empty()) {
            body.insert("Marker".to_string(), json!(marker));
        }
        if let Some(sharding_key) = &input.sharding_key {
            body.insert("ShardingKey".to_string(), json!(sharding_key));
        }
        if let Some(limit) = input.limit {
            body.insert("Limit".to_string(), json!(limit));
        }
        if let Some(total_segments) = input.total_segments {
            body.insert("TotalSegment".to_string(), json!(total_segments));
            body.insert("Segment".to_string(), json!(input.segment));
        }
        if let Some(start) = &input.sort_key_range_start {
            body.insert("SortKeyRangeStart".to_string(), json!(start));
        }
        if let Some(end) = &input.sort_key_range_end {
            body.insert("SortKeyRangeEnd".to_string(), json!(end));
        }
        if let Some(scatter) = &input.allow_object_scatter {
            body.insert("AllowObjectScatter".to_string(), json!(scatter));
        }
        if let Some(return_data) = &input.return_data {
            body.insert("ReturnData".to_string(), json!(return_data));
        }
        if let Some(data_max_size) = input.data_max_size {
            body.insert("DataMaxSize".to_string(), json!(data_max_size));
        }

        let mut headers = function_headers("GetItems");
        if !input.request_json_response {
            headers.push((
                "X-v3io-response-content-type".to_string(),
                "capnp".to_string(),
            ));
        }

        if let Some(mtime_secs) = &input.data_plane.mtime_secs {
            headers.push(("conditional-mtime-sec".to_string(), mtime_secs.clone()));
            if let Some(mtime_nsecs) = &input.data_plane.mtime_nsecs {
                headers.push(("conditional-mtime-nsec".to_string(), mtime_nsecs.clone()));
            }
        }

        let encoded = Value::Object(body).to_string();
        let mut response = self
            .send_request(
                &input.data_plane,
                HttpMethod::Put,
                &input.path,
                "",
                headers,
                Bytes::from(encoded),
            )
            .await?;

        let output = self.parse_get_items_response(input, &response)?;
        response.set_output(Output::GetItems(output));
        Ok(response)
    }

    fn parse_get_items_response(
        &self,
        input: &GetItemsInput,
        response: &Response,
    ) -> Result<GetItemsOutput> {
        let content_type = response.header("Content-Type").unwrap_or_default();
        if content_type == CONTENT_TYPE_CAPNP {
            self.parse_get_items_framed(input, response)
        } else {
            self.parse_get_items_json(input, response)
        }
    }

    fn parse_get_items_json(
        &self,
        input: &GetItemsInput,
        response: &Response,
    ) -> Result<GetItemsOutput> {
        let envelope: GetItemsJsonEnvelope = serde_json::from_slice(response.body())
            .map_err(|e| V3ioError::Decode(format!("item scan envelope: {e}")))?;

        let last = envelope.last_item_included.parse().unwrap_or(false);
        let scattered = envelope.scattered.parse().unwrap_or(false);

        // a non-advancing marker would send the caller into an infinite loop
        if !last
            && (envelope.next_marker.is_empty()
                || Some(envelope.next_marker.as_str()) == input.marker.as_deref())
        {
            tracing::warn!(
                next_marker = %envelope.next_marker,
                path = %input.path,
                "item scan response is not last but the marker did not advance"
            );
        }

        let mut items = Vec::with_capacity(envelope.items.len());
        for typed_item in &envelope.items {
            items.push(decode_item(typed_item)?);
        }

        Ok(GetItemsOutput {
            last,
            next_marker: envelope.next_marker,
            scattered,
            items,
        })
    }

    fn parse_get_items_framed(
        &self,
        input: &GetItemsInput,
        response: &Response,
    ) -> Result<GetItemsOutput> {
        let with_wildcard = input
            .attribute_names
            .iter()
            .any(|name| name == "*" || name == "**");

        let decoded = decode_framed_items(response.body())?;

        let cookie = response.header("X-v3io-cookie").unwrap_or_default().to_string();
        let scattered = response.header("X-v3io-scattered") == Some("TRUE");

        let mut items = Vec::with_capacity(decoded.len());
        for (name, mut attributes) in decoded {
            if with_wildcard {
                attributes.insert(NAME_ATTRIBUTE.to_string(), AttrValue::Str(name));
            }
            items.push(attributes);
        }

        Ok(GetItemsOutput {
            last: cookie.is_empty(),
            next_marker: cookie,
            scattered,
            items,
        })
    }

    /// Writes a single item's attributes.
    pub async fn put_item(&self, input: &PutItemInput) -> Result<Response> {
        let mut body = Map::new();
        if let Some(update_mode) = &input.update_mode {
            body.insert("UpdateMode".to_string(), json!(update_mode));
        }

        let mut response = self
            .put_item_request(
                &input.data_plane,
                &input.path,
                &input.attributes,
                input.condition.as_deref(),
                body,
            )
            .await?;

        let (mtime_secs, mtime_nsecs) = mtime_output(&response)?;
        response.set_output(Output::PutItem(PutItemOutput {
            mtime_secs,
            mtime_nsecs,
        }));
        Ok(response)
    }

    /// Writes a batch of items, one request per item.
    ///
    /// Per-key errors accumulate into the output map; success simply means
    /// the map stayed empty. There is no transactional rollback.
    pub async fn put_items(&self, input: &PutItemsInput) -> Result<Response> {
        let mut output = PutItemsOutput {
            success: true,
            errors: HashMap::new(),
        };

        for (item_key, attributes) in &input.items {
            let item_path = format!("{}/{}", input.path.trim_end_matches('/'), item_key);
            let result = self
                .put_item_request(
                    &input.data_plane,
                    &item_path,
                    attributes,
                    input.condition.as_deref(),
                    Map::new(),
                )
                .await;

            match result {
                Ok(response) => response.release(),
                Err(error) => {
                    output.success = false;
                    output.errors.insert(item_key.clone(), error);
                }
            }
        }

        let mut response = self.pool().empty();
        response.set_output(Output::PutItems(output));
        Ok(response)
    }

    /// Updates a single item, by attribute merge or by update expression.
    pub async fn update_item(&self, input: &UpdateItemInput) -> Result<Response> {
        if let Some(attributes) = &input.attributes {
            let mut body = Map::new();
            body.insert(
                "UpdateMode".to_string(),
                json!(input
                    .update_mode
                    .as_deref()
                    .unwrap_or(UPDATE_MODE_CREATE_OR_REPLACE)),
            );

            let mut response = self
                .put_item_request(
                    &input.data_plane,
                    &input.path,
                    attributes,
                    input.condition.as_deref(),
                    body,
                )
                .await?;

            let (mtime_secs, mtime_nsecs) = mtime_output(&response)?;
            response.set_output(Output::UpdateItem(UpdateItemOutput {
                mtime_secs,
                mtime_nsecs,
            }));
            return Ok(response);
        }

        let Some(expression) = &input.expression else {
            return Err(V3ioError::MalformedAttribute(
                "update item requires attributes or an update expression".to_string(),
            ));
        };

        let mut body = Map::new();
        body.insert("UpdateExpression".to_string(), json!(expression));
        body.insert(
            "UpdateMode".to_string(),
            json!(input
                .update_mode
                .as_deref()
                .unwrap_or(UPDATE_MODE_CREATE_OR_REPLACE)),
        );
        if let Some(condition) = input.condition.as_deref().filter(|c| !c.is_empty()) {
            body.insert("ConditionExpression".to_string(), json!(condition));
        }

        let mut response = self
            .send_request(
                &input.data_plane,
                HttpMethod::Post,
                &input.path,
                "",
                function_headers("UpdateItem"),
                Bytes::from(Value::Object(body).to_string()),
            )
            .await?;

        let (mtime_secs, mtime_nsecs) = mtime_output(&response)?;
        response.set_output(Output::UpdateItem(UpdateItemOutput {
            mtime_secs,
            mtime_nsecs,
        }));
        Ok(response)
    }

    /// Sends one `PutItem` envelope: typed attributes, optional condition
    /// and whatever extra body fields the caller prepared.
    pub(crate) async fn put_item_request(
        &self,
        input: &DataPlaneInput,
        path: &str,
        attributes: &Item,
        condition: Option<&str>,
        mut body: Map<String, Value>,
    ) -> Result<Response> {
        body.insert("Item".to_string(), encode_item(attributes));

        if let Some(condition) = condition.filter(|c| !c.is_empty()) {
            body.insert("ConditionExpression".to_string(), json!(condition));
        }

        self.send_request(
            input,
            HttpMethod::Put,
            path,
            "",
            function_headers("PutItem"),
            Bytes::from(Value::Object(body).to_string()),
        )
        .await
    }
}

/// Parses the server-assigned modification time off a write response.
fn mtime_output(response: &Response) -> Result<(i64, i64)> {
    let header = response
        .header(TRANSACTION_VERIFIER_HEADER)
        .unwrap_or_default();
    parse_mtime_header(header)
}
