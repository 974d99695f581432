//! S3 object store.

use std::future::Future;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use tokio::runtime::Handle;

use super::{ObjectStore, PutOptions, StorageError};

/// Runs `fut` to completion on `handle` from synchronous code.
///
/// Worker threads outside the runtime block directly; callers already inside
/// a runtime worker go through `block_in_place`.
pub(crate) fn block_on<F: Future>(handle: &Handle, fut: F) -> F::Output {
    if Handle::try_current().is_ok() {
        tokio::task::block_in_place(|| handle.block_on(fut))
    } else {
        handle.block_on(fut)
    }
}

/// [`ObjectStore`] backed by Amazon S3.
pub struct S3Store {
    client: Client,
    handle: Handle,
}

impl S3Store {
    pub fn new(client: Client, handle: Handle) -> Self {
        Self { client, handle }
    }

    /// Builds a client from the default credential and region chain.
    pub fn from_env(handle: Handle) -> Self {
        let config = block_on(
            &handle,
            aws_config::load_defaults(aws_config::BehaviorVersion::latest()),
        );
        Self::new(Client::new(&config), handle)
    }
}

impl ObjectStore for S3Store {
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        options: &PutOptions,
    ) -> Result<(), StorageError> {
        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes));
        if let Some(content_type) = &options.content_type {
            request = request.content_type(content_type);
        }
        if options.public_read {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }

        block_on(&self.handle, request.send()).map_err(|e| {
            StorageError::Remote(format!("put s3://{}/{} failed: {}", bucket, key, e))
        })?;
        Ok(())
    }
}
