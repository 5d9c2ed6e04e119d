/// Native FFmpeg decoder providing a safe frame source over the libav C bindings
///
/// All unsafe FFmpeg calls are contained in this module. Frames are converted
/// to tightly packed RGB24 before leaving it.

use super::FrameSource;
use crate::models::capture::{CaptureError, CaptureResult, RawFrame};
use std::ffi::CString;
use std::path::Path;
use std::ptr;
use thiserror::Error;

// Import FFmpeg C bindings
use ffmpeg_sys_next::*;

#[derive(Error, Debug)]
pub enum FFmpegError {
    #[error("Failed to open input: {0}")]
    OpenInputFailed(String),
    #[error("No video stream found")]
    NoVideoStream,
    #[error("Decoder not found for codec id {0}")]
    DecoderNotFound(i32),
    #[error("Failed to allocate codec context")]
    CodecContextAllocation,
    #[error("Failed to open codec: {0}")]
    CodecOpenFailed(String),
    #[error("Failed to allocate frame")]
    FrameAllocation,
    #[error("Failed to allocate packet")]
    PacketAllocation,
    #[error("Decoding error: {0}")]
    DecodingError(String),
    #[error("Failed to initialize swscale context")]
    SwscaleInitFailed,
    #[error("Color conversion failed")]
    ColorConversionFailed,
}

impl From<FFmpegError> for CaptureError {
    fn from(e: FFmpegError) -> Self {
        CaptureError::DecodeFailed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FFmpegError>;

/// Size and pixel format of decoded frames a scaler was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScalerSource {
    width: i32,
    height: i32,
    format: i32,
}

impl ScalerSource {
    fn new(width: i32, height: i32, format: i32) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(FFmpegError::DecodingError(format!(
                "Decoded frame has invalid size {}x{}",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            format,
        })
    }
}

/// Safe wrapper around an FFmpeg demuxer and video decoder
pub struct FFmpegDecoder {
    format_context: *mut AVFormatContext,
    codec_context: *mut AVCodecContext,
    frame: *mut AVFrame,
    rgb_frame: *mut AVFrame,
    packet: *mut AVPacket,
    sws_context: *mut SwsContext,
    sws_source: Option<ScalerSource>,
    stream_index: i32,
    width: u32,
    height: u32,
    next_index: u64,
    draining: bool,
    finished: bool,
}

unsafe impl Send for FFmpegDecoder {}

impl FFmpegDecoder {
    /// Open `path` and prepare to decode its best video stream
    pub fn open(path: &Path) -> CaptureResult<Self> {
        let unavailable = |reason: String| CaptureError::SourceUnavailable {
            path: path.display().to_string(),
            reason,
        };

        let path_c = CString::new(path.to_string_lossy().as_bytes())
            .map_err(|_| unavailable("path contains a NUL byte".to_string()))?;

        // Null every pointer first so Drop can clean up a partially built decoder
        let mut decoder = Self {
            format_context: ptr::null_mut(),
            codec_context: ptr::null_mut(),
            frame: ptr::null_mut(),
            rgb_frame: ptr::null_mut(),
            packet: ptr::null_mut(),
            sws_context: ptr::null_mut(),
            sws_source: None,
            stream_index: -1,
            width: 0,
            height: 0,
            next_index: 0,
            draining: false,
            finished: false,
        };

        unsafe {
            decoder
                .init(&path_c)
                .map_err(|e| unavailable(e.to_string()))?;
        }

        Ok(decoder)
    }

    unsafe fn init(&mut self, path_c: &CString) -> Result<()> {
        let ret = avformat_open_input(
            &mut self.format_context,
            path_c.as_ptr(),
            ptr::null(),
            ptr::null_mut(),
        );
        if ret < 0 || self.format_context.is_null() {
            self.format_context = ptr::null_mut();
            return Err(FFmpegError::OpenInputFailed(format!("Error code: {}", ret)));
        }

        let ret = avformat_find_stream_info(self.format_context, ptr::null_mut());
        if ret < 0 {
            return Err(FFmpegError::OpenInputFailed(format!(
                "Stream info unavailable, error code: {}",
                ret
            )));
        }

        let stream_index = av_find_best_stream(
            self.format_context,
            AVMediaType::AVMEDIA_TYPE_VIDEO,
            -1,
            -1,
            ptr::null_mut(),
            0,
        );
        if stream_index < 0 {
            return Err(FFmpegError::NoVideoStream);
        }
        self.stream_index = stream_index;

        let stream = *(*self.format_context).streams.offset(stream_index as isize);
        let codecpar = (*stream).codecpar;

        let codec = avcodec_find_decoder((*codecpar).codec_id);
        if codec.is_null() {
            return Err(FFmpegError::DecoderNotFound((*codecpar).codec_id as i32));
        }

        self.codec_context = avcodec_alloc_context3(codec);
        if self.codec_context.is_null() {
            return Err(FFmpegError::CodecContextAllocation);
        }

        let ret = avcodec_parameters_to_context(self.codec_context, codecpar);
        if ret < 0 {
            return Err(FFmpegError::CodecOpenFailed(format!("Error code: {}", ret)));
        }

        let ret = avcodec_open2(self.codec_context, codec, ptr::null_mut());
        if ret < 0 {
            return Err(FFmpegError::CodecOpenFailed(format!("Error code: {}", ret)));
        }

        let (width, height) = ((*self.codec_context).width, (*self.codec_context).height);
        if width <= 0 || height <= 0 {
            return Err(FFmpegError::CodecOpenFailed(
                "Stream has no frame dimensions".to_string(),
            ));
        }
        self.width = width as u32;
        self.height = height as u32;

        self.frame = av_frame_alloc();
        if self.frame.is_null() {
            return Err(FFmpegError::FrameAllocation);
        }

        self.rgb_frame = av_frame_alloc();
        if self.rgb_frame.is_null() {
            return Err(FFmpegError::FrameAllocation);
        }
        (*self.rgb_frame).format = AVPixelFormat::AV_PIX_FMT_RGB24 as i32;
        (*self.rgb_frame).width = width;
        (*self.rgb_frame).height = height;
        if av_frame_get_buffer(self.rgb_frame, 0) < 0 {
            return Err(FFmpegError::FrameAllocation);
        }

        self.packet = av_packet_alloc();
        if self.packet.is_null() {
            return Err(FFmpegError::PacketAllocation);
        }

        Ok(())
    }

    /// Decode the next frame into `self.frame`, false at end of stream
    unsafe fn decode_next(&mut self) -> Result<bool> {
        loop {
            let ret = avcodec_receive_frame(self.codec_context, self.frame);
            if ret == 0 {
                return Ok(true);
            }
            if ret == AVERROR_EOF {
                return Ok(false);
            }
            if ret != AVERROR(EAGAIN) {
                return Err(FFmpegError::DecodingError(format!(
                    "Receive frame failed: {}",
                    ret
                )));
            }
            if self.draining {
                return Ok(false);
            }

            // Decoder needs more input
            let ret = av_read_frame(self.format_context, self.packet);
            if ret < 0 {
                // End of container: flush the decoder
                avcodec_send_packet(self.codec_context, ptr::null());
                self.draining = true;
                continue;
            }

            if (*self.packet).stream_index != self.stream_index {
                av_packet_unref(self.packet);
                continue;
            }

            let ret = avcodec_send_packet(self.codec_context, self.packet);
            av_packet_unref(self.packet);
            if ret < 0 && ret != AVERROR(EAGAIN) {
                return Err(FFmpegError::DecodingError(format!(
                    "Send packet failed: {}",
                    ret
                )));
            }
        }
    }

    /// Convert the decoded frame to packed RGB24 at the size reported on open.
    ///
    /// Frames whose size changed mid-stream are scaled back to that size.
    unsafe fn convert_current(&mut self) -> Result<Vec<u8>> {
        let pix_fmt = (*self.codec_context).pix_fmt;
        if (*self.frame).format != pix_fmt as i32 {
            return Err(FFmpegError::DecodingError(format!(
                "Frame pixel format {} does not match decoder format {}",
                (*self.frame).format,
                pix_fmt as i32
            )));
        }
        let source = ScalerSource::new((*self.frame).width, (*self.frame).height, pix_fmt as i32)?;

        if self.sws_source != Some(source) && !self.sws_context.is_null() {
            tracing::debug!(
                "Decoded frame size changed to {}x{}, rebuilding scaler",
                source.width,
                source.height
            );
            sws_freeContext(self.sws_context);
            self.sws_context = ptr::null_mut();
        }

        if self.sws_context.is_null() {
            // Source pixel format is only reliable once a frame has been decoded
            self.sws_context = sws_getContext(
                source.width,
                source.height,
                pix_fmt,
                self.width as i32,
                self.height as i32,
                AVPixelFormat::AV_PIX_FMT_RGB24,
                2, // SWS_BILINEAR
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null(),
            );
            if self.sws_context.is_null() {
                self.sws_source = None;
                return Err(FFmpegError::SwscaleInitFailed);
            }
            self.sws_source = Some(source);
        }

        if av_frame_make_writable(self.rgb_frame) < 0 {
            return Err(FFmpegError::ColorConversionFailed);
        }

        let ret = sws_scale(
            self.sws_context,
            (*self.frame).data.as_ptr() as *const *const u8,
            (*self.frame).linesize.as_ptr(),
            0,
            source.height,
            (*self.rgb_frame).data.as_ptr() as *const *mut u8,
            (*self.rgb_frame).linesize.as_ptr(),
        );
        if ret < 0 {
            return Err(FFmpegError::ColorConversionFailed);
        }

        // Copy out row by row, the frame buffer rows are padded to linesize
        let row_len = self.width as usize * 3;
        let stride = (*self.rgb_frame).linesize[0] as usize;
        let base = (*self.rgb_frame).data[0];
        let mut data = Vec::with_capacity(row_len * self.height as usize);
        for y in 0..self.height as usize {
            let row = std::slice::from_raw_parts(base.add(y * stride), row_len);
            data.extend_from_slice(row);
        }

        av_frame_unref(self.frame);
        Ok(data)
    }
}

impl FrameSource for FFmpegDecoder {
    fn next_frame(&mut self) -> CaptureResult<Option<RawFrame>> {
        if self.finished {
            return Ok(None);
        }

        let data = unsafe {
            if !self.decode_next()? {
                self.finished = true;
                return Ok(None);
            }
            self.convert_current()?
        };

        let frame = RawFrame::rgb(self.next_index, self.width, self.height, data);
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for FFmpegDecoder {
    fn drop(&mut self) {
        unsafe {
            // Clean up resources in reverse order
            if !self.sws_context.is_null() {
                sws_freeContext(self.sws_context);
            }

            if !self.packet.is_null() {
                av_packet_free(&mut self.packet);
            }

            if !self.rgb_frame.is_null() {
                av_frame_free(&mut self.rgb_frame);
            }

            if !self.frame.is_null() {
                av_frame_free(&mut self.frame);
            }

            if !self.codec_context.is_null() {
                avcodec_free_context(&mut self.codec_context);
            }

            if !self.format_context.is_null() {
                avformat_close_input(&mut self.format_context);
            }
        }
    }
}
