//! Container operations: listing, cluster metadata and contents.

use bytes::Bytes;
use v3io_core::{Result, V3ioError};

use super::{function_headers, DataPlane};
use crate::response::Response;
use crate::transport::HttpMethod;
use crate::types::{
    GetClusterMdInput, GetClusterMdOutput, GetContainerContentsInput, GetContainerContentsOutput,
    GetContainersInput, GetContainersOutput, Output,
};

impl DataPlane {
    /// Lists the tenant's containers.
    pub async fn get_containers(&self, input: &GetContainersInput) -> Result<Response> {
        let mut response = self
            .send_request(
                &input.data_plane,
                HttpMethod::Get,
                "",
                "",
                Vec::new(),
                Bytes::new(),
            )
            .await?;

        let output: GetContainersOutput = serde_json::from_slice(response.body())
            .map_err(|e| V3ioError::Decode(format!("container listing: {e}")))?;
        response.set_output(Output::GetContainers(output));
        Ok(response)
    }

    /// Fetches cluster metadata.
    pub async fn get_cluster_md(&self, input: &GetClusterMdInput) -> Result<Response> {
        let mut response = self
            .send_request(
                &input.data_plane,
                HttpMethod::Put,
                "",
                "",
                function_headers("GetClusterMD"),
                Bytes::new(),
            )
            .await?;

        let output: GetClusterMdOutput = serde_json::from_slice(response.body())
            .map_err(|e| V3ioError::Decode(format!("cluster metadata: {e}")))?;
        response.set_output(Output::GetClusterMd(output));
        Ok(response)
    }

    /// Lists a container's contents under a prefix.
    ///
    /// While the output reports `is_truncated`, passing its `next_marker`
    /// into the next call continues the listing.
    pub async fn get_container_contents(
        &self,
        input: &GetContainerContentsInput,
    ) -> Result<Response> {
        let mut query = String::new();

        if !input.path.is_empty() {
            query.push_str("prefix=");
            let encoded: String =
                url::form_urlencoded::byte_serialize(input.path.as_bytes()).collect();
            query.push_str(&encoded.replace('+', "%20"));
        }

        if input.directories_only {
            query.push_str("&prefix-only=1");
        }

        if input.get_all_attributes {
            query.push_str("&prefix-info=1");
        }

        if let Some(marker) = input.marker.as_deref().filter(|marker| !marker.is_empty()) {
            query.push_str("&marker=");
            query.push_str(marker);
        }

        if let Some(limit) = input.limit.filter(|&limit| limit > 0) {
            query.push_str("&max-keys=");
            query.push_str(&limit.to_string());
        }

        let mut response = self
            .send_request(
                &input.data_plane,
                HttpMethod::Get,
                "",
                &query,
                Vec::new(),
                Bytes::new(),
            )
            .await?;

        let output: GetContainerContentsOutput = serde_json::from_slice(response.body())
            .map_err(|e| V3ioError::Decode(format!("container contents: {e}")))?;
        response.set_output(Output::GetContainerContents(output));
        Ok(response)
    }
}
