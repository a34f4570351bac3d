//! Object operations: ranged reads, writes, metadata updates and deletes.

use bytes::{Bytes, BytesMut};
use v3io_core::{Result, V3ioError};

use super::{DataPlane, FUNCTION_HEADER};
use crate::response::Response;
use crate::transport::HttpMethod;
use crate::types::{
    CheckPathExistsInput, DeleteObjectInput, GetObjectInput, PutObjectInput, PutOosObjectInput,
    UpdateObjectInput,
};

impl DataPlane {
    /// Reads an object, optionally a byte range of it.
    ///
    /// The returned response's body is the object payload; the caller
    /// releases the response.
    pub async fn get_object(&self, input: &GetObjectInput) -> Result<Response> {
        let mut headers = Vec::new();

        if input.offset != 0 || input.num_bytes != 0 {
            // the Range header is inclusive on both ends
            headers.push((
                "Range".to_string(),
                format!(
                    "bytes={}-{}",
                    input.offset,
                    input.offset + input.num_bytes - 1
                ),
            ));
        }

        if input.ctime_sec > 0 {
            headers.push(("ctime-sec".to_string(), input.ctime_sec.to_string()));
            headers.push(("ctime-nsec".to_string(), input.ctime_nsec.to_string()));
        }

        self.send_request(
            &input.data_plane,
            HttpMethod::Get,
            &input.path,
            "",
            headers,
            Bytes::new(),
        )
        .await
    }

    /// Writes an object, replacing it or appending to its end.
    pub async fn put_object(&self, input: &PutObjectInput) -> Result<()> {
        let mut headers = Vec::new();
        if input.append {
            headers.push(("Range".to_string(), "-1".to_string()));
        }

        self.send_request(
            &input.data_plane,
            HttpMethod::Put,
            &input.path,
            "",
            headers,
            Bytes::from(input.body.clone()),
        )
        .await?
        .release();

        Ok(())
    }

    /// Updates directory metadata (mode, uid/gid and times).
    pub async fn update_object(&self, input: &UpdateObjectInput) -> Result<()> {
        let body = serde_json::to_vec(&input.dir_attributes)
            .map_err(|e| V3ioError::Decode(format!("dir attributes: {e}")))?;

        let headers = vec![(FUNCTION_HEADER.to_string(), "DirSetAttr".to_string())];

        self.send_request(
            &input.data_plane,
            HttpMethod::Put,
            &input.path,
            "",
            headers,
            Bytes::from(body),
        )
        .await?
        .release();

        Ok(())
    }

    /// Deletes an object.
    pub async fn delete_object(&self, input: &DeleteObjectInput) -> Result<()> {
        self.send_request(
            &input.data_plane,
            HttpMethod::Delete,
            &input.path,
            "",
            Vec::new(),
            Bytes::new(),
        )
        .await?
        .release();

        Ok(())
    }

    /// Checks whether a path exists.
    pub async fn check_path_exists(&self, input: &CheckPathExistsInput) -> Result<()> {
        self.send_request(
            &input.data_plane,
            HttpMethod::Head,
            &input.path,
            "",
            Vec::new(),
            Bytes::new(),
        )
        .await?
        .release();

        Ok(())
    }

    /// Writes an object out-of-band from a header iovec plus payload iovecs.
    ///
    /// The body is the header followed by the payload iovecs, concatenated;
    /// `io-vec-num` counts the header, and `io-vec-sizes` lists every iovec
    /// length in order, comma-joined.
    pub async fn put_oos_object(&self, input: &PutOosObjectInput) -> Result<()> {
        let mut iovec_sizes = String::with_capacity(7 * (input.data.len() + 1));
        iovec_sizes.push_str(&input.header.len().to_string());

        let mut total_size = input.header.len();
        for iovec in &input.data {
            total_size += iovec.len();
            iovec_sizes.push(',');
            iovec_sizes.push_str(&iovec.len().to_string());
        }

        let mut body = BytesMut::with_capacity(total_size);
        body.extend_from_slice(&input.header);
        for iovec in &input.data {
            body.extend_from_slice(iovec);
        }

        let headers = vec![
            ("Content-Type".to_string(), "application/octet-stream".to_string()),
            (FUNCTION_HEADER.to_string(), "PutOOSObject".to_string()),
            ("io-vec-num".to_string(), (input.data.len() + 1).to_string()),
            ("io-vec-sizes".to_string(), iovec_sizes),
        ];

        self.send_request(
            &input.data_plane,
            HttpMethod::Put,
            &input.path,
            "",
            headers,
            body.freeze(),
        )
        .await?
        .release();

        Ok(())
    }
}
