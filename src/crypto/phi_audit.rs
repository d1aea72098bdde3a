// Static scan of every source file for tracing calls that would write
// patient data (readings, medication names, patient ids, message text) into
// logs. Logs carry opaque ids only.
