//! Driver entry points.
//!
//! With `axdd132x-sdk` these resolve to `AxDD132x.dll`. Without it, each
//! entry point is a Rust-ABI stub that panics, so the rest of the workspace
//! builds and tests on machines without the vendor driver. Check
//! [`SDK_LINKED`](crate::SDK_LINKED) before calling.

use std::os::raw::{c_char, c_int, c_short};

use crate::records::{
    DD132X_CalibrationData, DD132X_Info, DD132X_PowerOnData, DD132X_Protocol,
    DD132X_StartAcqInfo,
};
use crate::types::{ADC_VALUE, BOOL, BYTE, DWORD, HDD132X, LONGLONG, UINT, WORD};

#[cfg(not(feature = "axdd132x-sdk"))]
const SDK_PANIC_MSG: &str = "AxDD132x function called but the axdd132x-sdk feature is not enabled. \
    Enable axdd132x-sdk (or `hardware` in daq-driver-digidata) to use the vendor driver.";

macro_rules! driver_functions {
    ($( pub fn $name:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty; )*) => {
        #[cfg(feature = "axdd132x-sdk")]
        extern "system" {
            $( pub fn $name($($arg: $ty),*) -> $ret; )*
        }

        $(
            #[cfg(not(feature = "axdd132x-sdk"))]
            #[allow(clippy::missing_safety_doc, clippy::panic)]
            pub unsafe fn $name($(_: $ty),*) -> $ret {
                panic!("{}", SDK_PANIC_MSG);
            }
        )*
    };
}

driver_functions! {
    // Find, open & close device.
    pub fn DD132X_RescanSCSIBus(pnError: *mut c_int) -> BOOL;
    pub fn DD132X_FindDevices(pInfo: *mut DD132X_Info, uMaxDevices: UINT, pnError: *mut c_int) -> UINT;
    pub fn DD132X_OpenDevice(byAdaptor: BYTE, byTarget: BYTE, pnError: *mut c_int) -> HDD132X;
    pub fn DD132X_OpenDeviceEx(
        byAdaptor: BYTE,
        byTarget: BYTE,
        pRamware: *const BYTE,
        uImageSize: UINT,
        pnError: *mut c_int,
    ) -> HDD132X;
    pub fn DD132X_CloseDevice(hDevice: HDD132X, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_GetDeviceInfo(hDevice: HDD132X, pInfo: *mut DD132X_Info, pnError: *mut c_int) -> BOOL;

    pub fn DD132X_Reset(hDevice: HDD132X, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_DownloadRAMware(
        hDevice: HDD132X,
        pRAMware: *const BYTE,
        uImageSize: UINT,
        pnError: *mut c_int,
    ) -> BOOL;

    // Get/set acquisition protocol information.
    pub fn DD132X_SetProtocol(hDevice: HDD132X, pProtocol: *const DD132X_Protocol, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_GetProtocol(hDevice: HDD132X, pProtocol: *mut DD132X_Protocol, pnError: *mut c_int) -> BOOL;

    // Start/stop acquisition.
    pub fn DD132X_StartAcquisition(hDevice: HDD132X, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_StopAcquisition(hDevice: HDD132X, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_PauseAcquisition(hDevice: HDD132X, bPause: BOOL, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_IsAcquiring(hDevice: HDD132X) -> BOOL;
    pub fn DD132X_IsPaused(hDevice: HDD132X) -> BOOL;
    pub fn DD132X_GetTimeAtStartOfAcquisition(
        hDevice: HDD132X,
        pStartAcqInfo: *mut DD132X_StartAcqInfo,
    ) -> BOOL;

    // Start/read ReadLast acquisition.
    pub fn DD132X_StartReadLast(hDevice: HDD132X, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_ReadLast(
        hDevice: HDD132X,
        pnBuffer: *mut ADC_VALUE,
        uNumSamples: UINT,
        pnError: *mut c_int,
    ) -> BOOL;

    // Monitor progress of the acquisition.
    pub fn DD132X_GetAcquisitionPosition(hDevice: HDD132X, puSampleCount: *mut LONGLONG, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_GetNumSamplesOutput(hDevice: HDD132X, puSampleCount: *mut LONGLONG, pnError: *mut c_int) -> BOOL;

    // Single read/write operations.
    pub fn DD132X_GetAIValue(hDevice: HDD132X, uChannel: UINT, pnValue: *mut c_short, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_GetDIValues(hDevice: HDD132X, pdwValues: *mut DWORD, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_PutAOValue(hDevice: HDD132X, uChannel: UINT, nValue: c_short, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_PutDOValues(hDevice: HDD132X, dwValues: DWORD, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_GetTelegraphs(
        hDevice: HDD132X,
        uFirstChannel: UINT,
        pnValue: *mut c_short,
        uValues: UINT,
        pnError: *mut c_int,
    ) -> BOOL;

    // Calibration & EEPROM interaction.
    pub fn DD132X_SetPowerOnOutputs(
        hDevice: HDD132X,
        pPowerOnData: *const DD132X_PowerOnData,
        pnError: *mut c_int,
    ) -> BOOL;
    pub fn DD132X_GetPowerOnOutputs(
        hDevice: HDD132X,
        pPowerOnData: *mut DD132X_PowerOnData,
        pnError: *mut c_int,
    ) -> BOOL;

    pub fn DD132X_Calibrate(
        hDevice: HDD132X,
        pCalibrationData: *mut DD132X_CalibrationData,
        pnError: *mut c_int,
    ) -> BOOL;
    pub fn DD132X_GetCalibrationData(
        hDevice: HDD132X,
        pCalibrationData: *mut DD132X_CalibrationData,
        pnError: *mut c_int,
    ) -> BOOL;
    pub fn DD132X_GetScsiTermStatus(hDevice: HDD132X, pbyStatus: *mut BYTE, pnError: *mut c_int) -> BOOL;

    pub fn DD132X_DTermRead(hDevice: HDD132X, pszBuf: *mut c_char, uMaxLen: UINT, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_DTermWrite(hDevice: HDD132X, pszBuf: *const c_char, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_DTermSetBaudRate(hDevice: HDD132X, uBaudRate: UINT, pnError: *mut c_int) -> BOOL;

    // Diagnostic functions.
    pub fn DD132X_GetLastErrorText(hDevice: HDD132X, pszMsg: *mut c_char, uMsgLen: UINT, pnError: *mut c_int) -> BOOL;
    pub fn DD132X_SetDebugMsgLevel(hDevice: HDD132X, uLevel: UINT, pnError: *mut c_int) -> BOOL;

    // Setup threshold level.
    pub fn DD132X_UpdateThresholdLevel(
        hDevice: HDD132X,
        pwOutputPulseThreshold: *const WORD,
        pwOutputPulseHystDelta: *const WORD,
    ) -> BOOL;
}
