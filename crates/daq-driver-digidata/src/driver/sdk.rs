//! [`DriverApi`] over the vendor DLL.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::ptr;

use axdd132x_sys as sys;
use axdd132x_sys::{
    DD132X_CalibrationData, DD132X_Info, DD132X_PowerOnData, DD132X_Protocol,
    DD132X_StartAcqInfo, BOOL, FALSE, HDD132X, TRUE,
};

use super::{c_buffer_to_string, DriverApi, RawHandle, RawResult};

/// Forwards every call to `AxDD132x.dll` through `axdd132x-sys`.
///
/// Without the `hardware` feature the underlying functions are stubs; the
/// entry points that need no handle then fail with `CANTCOMPLETE`, so no
/// handle (and no further call) can be obtained.
#[derive(Debug, Clone, Copy, Default)]
pub struct SdkDriver;

/// Addresses on the bus: 8 adaptors of 16 targets.
pub(crate) const MAX_BUS_DEVICES: u32 = 8 * 16;

fn check(ok: BOOL, error: c_int) -> RawResult<()> {
    if ok != FALSE {
        Ok(())
    } else {
        Err(error)
    }
}

fn linked() -> RawResult<()> {
    if sys::SDK_LINKED {
        Ok(())
    } else {
        Err(sys::DD132X_ERROR_CANTCOMPLETE)
    }
}

fn hdev(handle: RawHandle) -> HDD132X {
    handle.0 as HDD132X
}

fn image_len(image: &[u8]) -> RawResult<u32> {
    u32::try_from(image.len()).map_err(|_| sys::DD132X_ERROR_RAMWAREREAD)
}

impl DriverApi for SdkDriver {
    fn name(&self) -> &'static str {
        "axdd132x"
    }

    fn rescan_scsi_bus(&self) -> RawResult<()> {
        linked()?;
        let mut error = 0;
        // SAFETY: error is a valid out pointer
        let ok = unsafe { sys::DD132X_RescanSCSIBus(&mut error) };
        check(ok, error)
    }

    fn find_devices(&self, max_devices: u32) -> RawResult<Vec<DD132X_Info>> {
        linked()?;
        let max_devices = max_devices.min(MAX_BUS_DEVICES);
        let mut infos = vec![DD132X_Info::default(); max_devices as usize];
        let mut error = 0;
        // SAFETY: infos has room for max_devices records
        let found = unsafe { sys::DD132X_FindDevices(infos.as_mut_ptr(), max_devices, &mut error) };
        if found == 0 && error != 0 {
            return Err(error);
        }
        infos.truncate((found as usize).min(max_devices as usize));
        Ok(infos)
    }

    fn open_device(&self, adaptor: u8, target: u8, ramware: Option<&[u8]>) -> RawResult<RawHandle> {
        linked()?;
        let mut error = 0;
        // SAFETY: the image slice outlives the call; error is a valid out pointer
        let handle = unsafe {
            match ramware {
                Some(image) => sys::DD132X_OpenDeviceEx(
                    adaptor,
                    target,
                    image.as_ptr(),
                    image_len(image)?,
                    &mut error,
                ),
                None => sys::DD132X_OpenDevice(adaptor, target, &mut error),
            }
        };
        if handle.is_null() {
            // A null handle with no code still means failure.
            return Err(if error != 0 { error } else { sys::DD132X_ERROR_CANTCOMPLETE });
        }
        Ok(RawHandle(handle as usize))
    }

    fn close_device(&self, handle: RawHandle) -> RawResult<()> {
        let mut error = 0;
        // SAFETY: handle came from open_device
        let ok = unsafe { sys::DD132X_CloseDevice(hdev(handle), &mut error) };
        check(ok, error)
    }

    fn get_device_info(&self, handle: RawHandle) -> RawResult<DD132X_Info> {
        let mut info = DD132X_Info::default();
        let mut error = 0;
        // SAFETY: info is a correctly stamped record
        let ok = unsafe { sys::DD132X_GetDeviceInfo(hdev(handle), &mut info, &mut error) };
        check(ok, error).map(|()| info)
    }

    fn reset(&self, handle: RawHandle) -> RawResult<()> {
        let mut error = 0;
        // SAFETY: handle came from open_device
        let ok = unsafe { sys::DD132X_Reset(hdev(handle), &mut error) };
        check(ok, error)
    }

    fn download_ramware(&self, handle: RawHandle, image: &[u8]) -> RawResult<()> {
        let mut error = 0;
        let len = image_len(image)?;
        // SAFETY: image outlives the call
        let ok = unsafe { sys::DD132X_DownloadRAMware(hdev(handle), image.as_ptr(), len, &mut error) };
        check(ok, error)
    }

    unsafe fn set_protocol(&self, handle: RawHandle, protocol: &DD132X_Protocol) -> RawResult<()> {
        let mut error = 0;
        // SAFETY: caller keeps the referenced buffer chains alive
        let ok = unsafe { sys::DD132X_SetProtocol(hdev(handle), protocol, &mut error) };
        check(ok, error)
    }

    fn get_protocol(&self, handle: RawHandle) -> RawResult<DD132X_Protocol> {
        let mut protocol = DD132X_Protocol::default();
        let mut error = 0;
        // SAFETY: protocol is a correctly stamped record
        let ok = unsafe { sys::DD132X_GetProtocol(hdev(handle), &mut protocol, &mut error) };
        check(ok, error).map(|()| protocol)
    }

    fn start_acquisition(&self, handle: RawHandle) -> RawResult<()> {
        let mut error = 0;
        // SAFETY: handle came from open_device
        let ok = unsafe { sys::DD132X_StartAcquisition(hdev(handle), &mut error) };
        check(ok, error)
    }

    fn stop_acquisition(&self, handle: RawHandle) -> RawResult<()> {
        let mut error = 0;
        // SAFETY: handle came from open_device
        let ok = unsafe { sys::DD132X_StopAcquisition(hdev(handle), &mut error) };
        check(ok, error)
    }

    fn pause_acquisition(&self, handle: RawHandle, pause: bool) -> RawResult<()> {
        let mut error = 0;
        let flag = if pause { TRUE } else { FALSE };
        // SAFETY: handle came from open_device
        let ok = unsafe { sys::DD132X_PauseAcquisition(hdev(handle), flag, &mut error) };
        check(ok, error)
    }

    fn is_acquiring(&self, handle: RawHandle) -> bool {
        // SAFETY: handle came from open_device
        unsafe { sys::DD132X_IsAcquiring(hdev(handle)) != FALSE }
    }

    fn is_paused(&self, handle: RawHandle) -> bool {
        // SAFETY: handle came from open_device
        unsafe { sys::DD132X_IsPaused(hdev(handle)) != FALSE }
    }

    fn time_at_start_of_acquisition(&self, handle: RawHandle) -> Option<DD132X_StartAcqInfo> {
        let mut info = DD132X_StartAcqInfo::default();
        // SAFETY: info is a correctly stamped record
        let ok = unsafe { sys::DD132X_GetTimeAtStartOfAcquisition(hdev(handle), &mut info) };
        (ok != FALSE).then_some(info)
    }

    fn start_read_last(&self, handle: RawHandle) -> RawResult<()> {
        let mut error = 0;
        // SAFETY: handle came from open_device
        let ok = unsafe { sys::DD132X_StartReadLast(hdev(handle), &mut error) };
        check(ok, error)
    }

    fn read_last(&self, handle: RawHandle, samples: &mut [i16]) -> RawResult<()> {
        let mut error = 0;
        let count = u32::try_from(samples.len()).map_err(|_| sys::DD132X_ERROR_READDATA)?;
        // SAFETY: samples holds count writable values
        let ok = unsafe { sys::DD132X_ReadLast(hdev(handle), samples.as_mut_ptr(), count, &mut error) };
        check(ok, error)
    }

    fn acquisition_position(&self, handle: RawHandle) -> RawResult<i64> {
        let mut count = 0;
        let mut error = 0;
        // SAFETY: out pointers are valid
        let ok = unsafe { sys::DD132X_GetAcquisitionPosition(hdev(handle), &mut count, &mut error) };
        check(ok, error).map(|()| count)
    }

    fn num_samples_output(&self, handle: RawHandle) -> RawResult<i64> {
        let mut count = 0;
        let mut error = 0;
        // SAFETY: out pointers are valid
        let ok = unsafe { sys::DD132X_GetNumSamplesOutput(hdev(handle), &mut count, &mut error) };
        check(ok, error).map(|()| count)
    }

    fn get_ai_value(&self, handle: RawHandle, channel: u32) -> RawResult<i16> {
        let mut value = 0;
        let mut error = 0;
        // SAFETY: out pointers are valid
        let ok = unsafe { sys::DD132X_GetAIValue(hdev(handle), channel, &mut value, &mut error) };
        check(ok, error).map(|()| value)
    }

    fn get_di_values(&self, handle: RawHandle) -> RawResult<u32> {
        let mut values = 0;
        let mut error = 0;
        // SAFETY: out pointers are valid
        let ok = unsafe { sys::DD132X_GetDIValues(hdev(handle), &mut values, &mut error) };
        check(ok, error).map(|()| values)
    }

    fn put_ao_value(&self, handle: RawHandle, channel: u32, value: i16) -> RawResult<()> {
        let mut error = 0;
        // SAFETY: handle came from open_device
        let ok = unsafe { sys::DD132X_PutAOValue(hdev(handle), channel, value, &mut error) };
        check(ok, error)
    }

    fn put_do_values(&self, handle: RawHandle, values: u32) -> RawResult<()> {
        let mut error = 0;
        // SAFETY: handle came from open_device
        let ok = unsafe { sys::DD132X_PutDOValues(hdev(handle), values, &mut error) };
        check(ok, error)
    }

    fn get_telegraphs(&self, handle: RawHandle, first_channel: u32, values: &mut [i16]) -> RawResult<()> {
        let mut error = 0;
        let count = u32::try_from(values.len()).map_err(|_| sys::DD132X_ERROR_READDATA)?;
        // SAFETY: values holds count writable values
        let ok = unsafe {
            sys::DD132X_GetTelegraphs(hdev(handle), first_channel, values.as_mut_ptr(), count, &mut error)
        };
        check(ok, error)
    }

    fn set_power_on_outputs(&self, handle: RawHandle, data: &DD132X_PowerOnData) -> RawResult<()> {
        let mut error = 0;
        // SAFETY: data is a valid record for the duration of the call
        let ok = unsafe { sys::DD132X_SetPowerOnOutputs(hdev(handle), data, &mut error) };
        check(ok, error)
    }

    fn get_power_on_outputs(&self, handle: RawHandle) -> RawResult<DD132X_PowerOnData> {
        let mut data = DD132X_PowerOnData::default();
        let mut error = 0;
        // SAFETY: data is a correctly stamped record
        let ok = unsafe { sys::DD132X_GetPowerOnOutputs(hdev(handle), &mut data, &mut error) };
        check(ok, error).map(|()| data)
    }

    fn calibrate(&self, handle: RawHandle) -> RawResult<DD132X_CalibrationData> {
        let mut data = DD132X_CalibrationData::default();
        let mut error = 0;
        // SAFETY: data is a correctly stamped record
        let ok = unsafe { sys::DD132X_Calibrate(hdev(handle), &mut data, &mut error) };
        check(ok, error).map(|()| data)
    }

    fn get_calibration_data(&self, handle: RawHandle) -> RawResult<DD132X_CalibrationData> {
        let mut data = DD132X_CalibrationData::default();
        let mut error = 0;
        // SAFETY: data is a correctly stamped record
        let ok = unsafe { sys::DD132X_GetCalibrationData(hdev(handle), &mut data, &mut error) };
        check(ok, error).map(|()| data)
    }

    fn get_scsi_term_status(&self, handle: RawHandle) -> RawResult<u8> {
        let mut status = 0;
        let mut error = 0;
        // SAFETY: out pointers are valid
        let ok = unsafe { sys::DD132X_GetScsiTermStatus(hdev(handle), &mut status, &mut error) };
        check(ok, error).map(|()| status)
    }

    fn dterm_read(&self, handle: RawHandle, max_len: usize) -> RawResult<Vec<u8>> {
        let mut buf = vec![0u8; max_len.max(1)];
        let len = u32::try_from(buf.len()).map_err(|_| sys::DD132X_ERROR_DTERM_READ)?;
        let mut error = 0;
        // SAFETY: buf holds len writable bytes
        let ok = unsafe {
            sys::DD132X_DTermRead(hdev(handle), buf.as_mut_ptr().cast::<c_char>(), len, &mut error)
        };
        check(ok, error)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        buf.truncate(end);
        Ok(buf)
    }

    fn dterm_write(&self, handle: RawHandle, text: &CStr) -> RawResult<()> {
        let mut error = 0;
        // SAFETY: text is NUL terminated and outlives the call
        let ok = unsafe { sys::DD132X_DTermWrite(hdev(handle), text.as_ptr(), &mut error) };
        check(ok, error)
    }

    fn dterm_set_baud_rate(&self, handle: RawHandle, baud_rate: u32) -> RawResult<()> {
        let mut error = 0;
        // SAFETY: handle came from open_device
        let ok = unsafe { sys::DD132X_DTermSetBaudRate(hdev(handle), baud_rate, &mut error) };
        check(ok, error)
    }

    fn get_last_error_text(&self, handle: RawHandle, max_len: usize) -> RawResult<String> {
        let mut buf = vec![0u8; max_len.max(1)];
        let len = u32::try_from(buf.len()).map_err(|_| sys::DD132X_ERROR_CANTCOMPLETE)?;
        let mut error = 0;
        // SAFETY: buf holds len writable bytes
        let ok = unsafe {
            sys::DD132X_GetLastErrorText(hdev(handle), buf.as_mut_ptr().cast::<c_char>(), len, &mut error)
        };
        check(ok, error).map(|()| c_buffer_to_string(&buf))
    }

    fn set_debug_msg_level(&self, handle: RawHandle, level: u32) -> RawResult<()> {
        let mut error = 0;
        // SAFETY: handle came from open_device
        let ok = unsafe { sys::DD132X_SetDebugMsgLevel(hdev(handle), level, &mut error) };
        check(ok, error)
    }

    fn update_threshold_level(&self, handle: RawHandle, threshold: u16, hysteresis: u16) -> bool {
        // SAFETY: both pointers refer to locals that outlive the call
        unsafe {
            sys::DD132X_UpdateThresholdLevel(hdev(handle), ptr::addr_of!(threshold), ptr::addr_of!(hysteresis))
                != FALSE
        }
    }
}
