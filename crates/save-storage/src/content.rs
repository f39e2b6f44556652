// SAVE Storage - key-addressed blob storage
// Copyright (C) 2026 SAVE Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! Streaming object bodies
//!
//! Every storage moves content as a [`ContentStream`]: a boxed, `'static`
//! stream of byte buffers. Downloads hand the stream straight to the caller,
//! uploads consume it chunk by chunk.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::io;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Object body as an ordered, finite sequence of byte buffers
pub type ContentStream = BoxStream<'static, io::Result<Bytes>>;

/// Stream a single in-memory buffer
pub fn from_bytes(data: impl Into<Bytes>) -> ContentStream {
    let data = data.into();
    if data.is_empty() {
        return empty();
    }
    stream::once(async move { Ok(data) }).boxed()
}

/// Stream with no chunks
pub fn empty() -> ContentStream {
    stream::empty().boxed()
}

/// Stream an opened file without loading it into memory
pub fn from_file(file: File) -> ContentStream {
    ReaderStream::new(file).boxed()
}

/// Drain a stream into one contiguous buffer
pub async fn collect(content: ContentStream) -> io::Result<Bytes> {
    let buffer = content
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await?;
    Ok(buffer.freeze())
}
